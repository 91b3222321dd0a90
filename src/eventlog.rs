//! Event Log Layer
//!
//! Incremental, resumable scanning of the OS event log for a fixed set of
//! event kinds.
//!
//! - [`EventKind`] / [`LogName`]: What is monitored and where it is logged
//! - [`EventLogSource`]: Platform query seam ([`PowerShellEventLog`] on Windows)
//! - [`EventLogScanner`]: Checkpointed scan cycle
//! - [`ScanBackoff`]: Adaptive scan interval

mod backoff;
mod kind;
mod record;
mod scanner;
mod source;

pub use backoff::{DEFAULT_MAX_INTERVAL, DEFAULT_SLOW_SCAN_THRESHOLD, ScanBackoff};
pub use kind::{EventKind, LogName};
pub use record::{EventRecord, RawEvent};
pub use scanner::{DEFAULT_LOOKBACK, EventLogScanner, MAX_LOOKBACK, ScanReport};
pub use source::{DEFAULT_QUERY_TIMEOUT, EventLogSource, PowerShellEventLog, ScanError};
