//! Owner of the trigger tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::scheduler::{Job, Trigger, TriggerState};
use crate::sink::{DEFAULT_SHUTDOWN_TIMEOUT, Dispatcher};

/// Snapshot of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerStatus {
    /// Trigger name.
    pub name: &'static str,
    /// Whether the handler is executing.
    pub running: bool,
    /// Completed runs.
    pub runs: u64,
}

/// Outcome of [`Scheduler::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every trigger stopped (and flushed) within the timeout.
    pub triggers_stopped: bool,
    /// Every in-flight publish finished within the timeout.
    pub sink_drained: bool,
}

/// Runs independent triggers on their own tasks.
///
/// Triggers may overlap each other but never themselves.
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
    triggers: Vec<(&'static str, Arc<TriggerState>)>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("triggers", &self.triggers.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler whose shutdown also drains `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            triggers: Vec::new(),
            dispatcher,
        }
    }

    /// Start `job` on its own task. Returns a handle for manual runs.
    ///
    /// With `run_at_start` the handler fires immediately instead of after
    /// the first interval.
    pub fn spawn<J: Job>(&mut self, job: J, run_at_start: bool) -> Trigger<J> {
        let trigger = Trigger::new(job);
        self.triggers.push((trigger.name(), trigger.state()));
        self.tracker
            .spawn(trigger.clone().drive(self.token.child_token(), run_at_start));
        tracing::info!(trigger = trigger.name(), run_at_start, "Trigger started");
        trigger
    }

    /// State of every trigger.
    pub fn status(&self) -> Vec<TriggerStatus> {
        self.triggers
            .iter()
            .map(|(name, state)| TriggerStatus {
                name: *name,
                running: state.is_running(),
                runs: state.runs(),
            })
            .collect()
    }

    /// Number of started triggers.
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Gracefully shutdown with the default timeout.
    pub async fn shutdown(self) -> ShutdownReport {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Cancel every trigger, let them flush, then drain the dispatcher.
    ///
    /// A handler already running is allowed to finish within `timeout`.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> ShutdownReport {
        self.token.cancel();
        self.tracker.close();

        let triggers_stopped = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !triggers_stopped {
            tracing::warn!(
                still_running = self.tracker.len(),
                "Triggers did not stop before shutdown timeout"
            );
        }

        let sink_drained = self.dispatcher.shutdown(timeout).await;
        if triggers_stopped && sink_drained {
            tracing::info!("Scheduler shutdown complete");
        }
        ShutdownReport {
            triggers_stopped,
            sink_drained,
        }
    }
}
