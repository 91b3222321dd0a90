//! Monitored event kinds and the event log each one lives in.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Operating-system event log that holds a group of event kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum LogName {
    /// The `Application` log.
    Application,
    /// The `System` log.
    System,
}

/// Event kinds the agent watches for.
///
/// Each kind is identified in the OS log by an `(event id, provider)` pair and
/// persisted in the checkpoint table under a stable integer [`code`](Self::code).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventKind {
    /// Application crash reported by Windows Error Reporting.
    ApplicationError,
    /// Application stopped responding.
    ApplicationHang,
    /// System recovered from a bugcheck (blue screen).
    SystemBugcheck,
    /// Previous shutdown was unexpected.
    UnexpectedShutdown,
}

impl EventKind {
    /// Every known kind, in code order.
    pub const ALL: [EventKind; 4] = [
        EventKind::ApplicationError,
        EventKind::ApplicationHang,
        EventKind::SystemBugcheck,
        EventKind::UnexpectedShutdown,
    ];

    /// Stable integer key used by the checkpoint table.
    pub fn code(self) -> i64 {
        match self {
            Self::ApplicationError => 1,
            Self::ApplicationHang => 2,
            Self::SystemBugcheck => 3,
            Self::UnexpectedShutdown => 4,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Log the kind is recorded in.
    pub fn log(self) -> LogName {
        match self {
            Self::ApplicationError | Self::ApplicationHang => LogName::Application,
            Self::SystemBugcheck | Self::UnexpectedShutdown => LogName::System,
        }
    }

    /// Event provider (source) name.
    pub fn provider(self) -> &'static str {
        match self {
            Self::ApplicationError => "Application Error",
            Self::ApplicationHang => "Application Hang",
            Self::SystemBugcheck => "Microsoft-Windows-WER-SystemErrorReporting",
            Self::UnexpectedShutdown => "EventLog",
        }
    }

    /// Event id within the provider.
    pub fn event_id(self) -> u32 {
        match self {
            Self::ApplicationError => 1000,
            Self::ApplicationHang => 1002,
            Self::SystemBugcheck => 1001,
            Self::UnexpectedShutdown => 6008,
        }
    }

    /// Whether a raw `(event id, provider)` pair identifies this kind.
    pub fn matches(self, event_id: u32, provider: &str) -> bool {
        self.event_id() == event_id && self.provider().eq_ignore_ascii_case(provider)
    }
}
