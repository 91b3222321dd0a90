//! Raw and classified event-log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eventlog::EventKind;

/// An entry as read from the OS log, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Numeric event id within the provider.
    pub event_id: u32,
    /// Provider (source) name.
    pub provider: String,
    /// When the event was logged.
    pub occurred_at: DateTime<Utc>,
    /// Rendered message text.
    #[serde(default)]
    pub message: String,
}

/// A new event of a monitored kind, ready to ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Classified kind.
    pub kind: EventKind,
    /// Provider (source) name as logged.
    pub source: String,
    /// Rendered message text.
    pub message: String,
    /// When the event was logged.
    pub occurred_at: DateTime<Utc>,
    /// Numeric event id.
    pub raw_code: u32,
}

impl EventRecord {
    /// Build a record from a raw entry already matched to `kind`.
    pub fn from_raw(kind: EventKind, raw: RawEvent) -> Self {
        Self {
            kind,
            source: raw.provider,
            message: raw.message,
            occurred_at: raw.occurred_at,
            raw_code: raw.event_id,
        }
    }
}
