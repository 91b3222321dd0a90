//! OS event-log access.
//!
//! [`EventLogSource`] is the seam between the scanner and the platform. The
//! Windows implementation queries `Get-WinEvent` through PowerShell and emits
//! one JSON document per event, so a malformed entry only loses that entry.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use crate::eventlog::{LogName, RawEvent};

/// Default limit on a single event-log query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised while querying one log or decoding one entry.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The log query itself failed.
    #[error("event log query failed: {0}")]
    Query(String),

    /// The query did not finish in time.
    #[error("event log query timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to spawn or talk to the query process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A single entry could not be decoded.
    #[error("failed to decode event: {0}")]
    Decode(String),
}

/// Read access to the OS event log.
#[async_trait::async_trait]
pub trait EventLogSource: Send + Sync + 'static {
    /// Fetch entries of `log` logged at or after `since`.
    ///
    /// `event_ids` narrows the query; the caller still classifies every entry.
    /// The outer error fails the whole batch, inner errors fail one entry.
    async fn fetch(
        &self,
        log: LogName,
        since: DateTime<Utc>,
        event_ids: &[u32],
    ) -> Result<Vec<Result<RawEvent, ScanError>>, ScanError>;
}

/// `Get-WinEvent` output shape, one object per line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinEventJson {
    id: u32,
    provider_name: String,
    time_created: String,
    #[serde(default)]
    message: Option<String>,
}

impl TryFrom<WinEventJson> for RawEvent {
    type Error = ScanError;

    fn try_from(value: WinEventJson) -> Result<Self, Self::Error> {
        let occurred_at = DateTime::parse_from_rfc3339(&value.time_created)
            .map_err(|e| ScanError::Decode(format!("TimeCreated '{}': {e}", value.time_created)))?
            .with_timezone(&Utc);
        Ok(RawEvent {
            event_id: value.id,
            provider: value.provider_name,
            occurred_at,
            message: value.message.unwrap_or_default(),
        })
    }
}

/// Decode one output line into a raw event.
pub(crate) fn decode_line(line: &str) -> Result<RawEvent, ScanError> {
    let json: WinEventJson =
        serde_json::from_str(line).map_err(|e| ScanError::Decode(e.to_string()))?;
    RawEvent::try_from(json)
}

/// Event-log source that shells out to Windows PowerShell.
#[derive(Debug, Clone)]
pub struct PowerShellEventLog {
    program: String,
    timeout: Duration,
}

impl PowerShellEventLog {
    /// Use `powershell.exe` with the default query timeout.
    pub fn new() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set the per-query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the PowerShell script for one log query.
    fn script(log: LogName, since: DateTime<Utc>, event_ids: &[u32]) -> String {
        // .NET parses at most seven fraction digits; truncating only widens the window.
        let since = since.to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut filter = format!("LogName = '{}'; StartTime = $start", log.as_ref());
        if !event_ids.is_empty() {
            let ids: Vec<String> = event_ids.iter().map(u32::to_string).collect();
            filter.push_str(&format!("; Id = {}", ids.join(",")));
        }

        format!(
            r#"$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
$start = [DateTime]::Parse('{since}', $null, [Globalization.DateTimeStyles]::RoundtripKind).ToLocalTime()
try {{
    $events = Get-WinEvent -FilterHashtable @{{ {filter} }} -Oldest
}} catch {{
    if ($_.FullyQualifiedErrorId -match 'NoMatchingEventsFound') {{ $events = @() }} else {{ throw }}
}}
foreach ($e in $events) {{
    [pscustomobject]@{{
        Id = $e.Id
        ProviderName = $e.ProviderName
        TimeCreated = $e.TimeCreated.ToUniversalTime().ToString('o')
        Message = $e.Message
    }} | ConvertTo-Json -Compress
}}"#
        )
    }
}

impl Default for PowerShellEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventLogSource for PowerShellEventLog {
    async fn fetch(
        &self,
        log: LogName,
        since: DateTime<Utc>,
        event_ids: &[u32],
    ) -> Result<Vec<Result<RawEvent, ScanError>>, ScanError> {
        let script = Self::script(log, since, event_ids);
        let output = Command::new(&self.program)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Query(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(decode_line)
            .collect())
    }
}
