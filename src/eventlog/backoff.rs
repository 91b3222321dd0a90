//! Adaptive event-log scan interval.

use std::time::Duration;

/// Default scan duration above which the interval is doubled.
pub const DEFAULT_SLOW_SCAN_THRESHOLD: Duration = Duration::from_secs(10);

/// Upper bound for the scan interval.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Scan-interval controller.
///
/// A scan slower than the threshold doubles the interval, capped at `max`.
/// With `decay` enabled, a fast scan halves it again, never below the
/// configured base interval.
#[derive(Debug, Clone)]
pub struct ScanBackoff {
    base: Duration,
    current: Duration,
    threshold: Duration,
    max: Duration,
    decay: bool,
}

impl ScanBackoff {
    /// Create a controller starting at `base`.
    pub fn new(base: Duration, threshold: Duration, max: Duration, decay: bool) -> Self {
        let max = max.max(base);
        Self {
            base,
            current: base,
            threshold,
            max,
            decay,
        }
    }

    /// Interval to wait before the next scan.
    pub fn interval(&self) -> Duration {
        self.current
    }

    /// Feed the wall-clock duration of a finished scan; returns the next interval.
    pub fn record(&mut self, elapsed: Duration) -> Duration {
        let previous = self.current;
        if elapsed > self.threshold {
            self.current = self.current.saturating_mul(2).min(self.max);
        } else if self.decay {
            self.current = (self.current / 2).max(self.base);
        }

        if self.current != previous {
            tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                previous = ?previous,
                next = ?self.current,
                "Event log scan interval adjusted"
            );
        }
        self.current
    }
}
