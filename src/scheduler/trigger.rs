//! Non-reentrant periodic triggers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Minimum interval accepted for any trigger (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Clamp an interval to [`MIN_INTERVAL`].
pub fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(min_interval = ?MIN_INTERVAL,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Work driven by a trigger.
///
/// A handler failure is the job's own business: `run` logs and returns, and
/// the trigger re-arms regardless.
#[async_trait]
pub trait Job: Send + 'static {
    /// Trigger name used in logs and status.
    fn name(&self) -> &'static str;

    /// Delay before the next run. Read after every run.
    fn interval(&self) -> Duration;

    /// Called once before the first run.
    async fn on_start(&mut self) {}

    /// One handler invocation.
    async fn run(&mut self);

    /// Called once after the trigger has been cancelled.
    async fn on_shutdown(&mut self) {}
}

/// Idle/running state of one trigger.
#[derive(Debug, Default)]
pub struct TriggerState {
    running: AtomicBool,
    runs: AtomicU64,
    skipped: AtomicU64,
}

impl TriggerState {
    /// Whether the handler is executing right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Completed handler runs.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Runs refused because the handler was already executing.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(self))
    }
}

struct RunGuard<'a>(&'a TriggerState);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.runs.fetch_add(1, Ordering::Relaxed);
        self.0.running.store(false, Ordering::Release);
    }
}

/// A job plus its running flag. Clones share both.
pub struct Trigger<J> {
    name: &'static str,
    job: Arc<Mutex<J>>,
    state: Arc<TriggerState>,
}

impl<J> Clone for Trigger<J> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            job: Arc::clone(&self.job),
            state: Arc::clone(&self.state),
        }
    }
}

impl<J> fmt::Debug for Trigger<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<J: Job> Trigger<J> {
    /// Wrap `job`.
    pub fn new(job: J) -> Self {
        Self {
            name: job.name(),
            job: Arc::new(Mutex::new(job)),
            state: Arc::new(TriggerState::default()),
        }
    }

    /// Trigger name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Shared running state.
    pub fn state(&self) -> Arc<TriggerState> {
        Arc::clone(&self.state)
    }

    /// Access the wrapped job.
    pub fn job(&self) -> &Arc<Mutex<J>> {
        &self.job
    }

    /// Run the handler now unless it is already running.
    ///
    /// Returns `false` when the call was refused.
    pub async fn run_once(&self) -> bool {
        let Some(_guard) = self.state.try_begin() else {
            self.state.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(trigger = self.name, "Trigger already running, skipped");
            return false;
        };

        let start = Instant::now();
        tracing::debug!(trigger = self.name, "Trigger fired");
        self.job.lock().await.run().await;
        tracing::debug!(
            trigger = self.name,
            duration_ms = start.elapsed().as_millis() as u64,
            "Trigger handler finished"
        );
        true
    }

    /// Timer loop: wait, run, re-arm, until `token` is cancelled.
    ///
    /// The handler is awaited inline, so the next wait only starts after it
    /// has returned.
    pub(crate) async fn drive(self, token: CancellationToken, run_at_start: bool) {
        self.job.lock().await.on_start().await;
        if run_at_start && !token.is_cancelled() {
            self.run_once().await;
        }

        loop {
            let delay = self.job.lock().await.interval();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.run_once().await;
        }

        self.job.lock().await.on_shutdown().await;
        tracing::debug!(trigger = self.name, runs = self.state.runs(), "Trigger stopped");
    }
}
