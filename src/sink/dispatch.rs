//! Fire-and-forget publishing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::sink::{MetricPoint, MetricsSink};

/// Default time to wait for in-flight writes at shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands batches to the sink on detached tasks.
///
/// `dispatch` never blocks the caller and never reports failure; a failed
/// write is logged and the batch is lost. In-flight writes are tracked so
/// shutdown can wait for them.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn MetricsSink>,
    tracker: TaskTracker,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher for `sink`.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            tracker: TaskTracker::new(),
        }
    }

    /// Publish `points` in the background. `origin` names the producer in logs.
    pub fn dispatch(&self, points: Vec<MetricPoint>, origin: &'static str) {
        if points.is_empty() {
            return;
        }
        if self.tracker.is_closed() {
            tracing::warn!(origin, points = points.len(), "Dispatcher closed, batch dropped");
            return;
        }
        let sink = Arc::clone(&self.sink);
        self.tracker.spawn(async move {
            let count = points.len();
            match sink.publish(&points).await {
                Ok(()) => tracing::debug!(origin, points = count, "Batch published"),
                Err(e) => tracing::warn!(origin, points = count, error = %e, "Publish failed"),
            }
        });
    }

    /// Writes still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting batches and wait up to `timeout` for in-flight writes.
    ///
    /// Returns `false` if writes were still running when the wait expired.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                tracing::debug!("Dispatcher drained");
                true
            }
            Err(_) => {
                tracing::warn!(
                    in_flight = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Dispatcher shutdown timed out"
                );
                false
            }
        }
    }
}
