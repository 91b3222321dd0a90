//! Event-log trigger with adaptive interval.

use std::time::Duration;

use async_trait::async_trait;

use crate::eventlog::{EventLogScanner, ScanBackoff, ScanReport};
use crate::scheduler::Job;
use crate::sink::{Dispatcher, PayloadAssembler};

/// Runs the scanner and forwards new records; the interval follows the
/// scan duration.
#[derive(Debug)]
pub struct EventLogJob {
    scanner: EventLogScanner,
    backoff: ScanBackoff,
    assembler: PayloadAssembler,
    dispatcher: Dispatcher,
}

impl EventLogJob {
    /// Create the job.
    pub fn new(
        scanner: EventLogScanner,
        backoff: ScanBackoff,
        assembler: PayloadAssembler,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            scanner,
            backoff,
            assembler,
            dispatcher,
        }
    }

    /// Run one scan and dispatch its records.
    pub async fn scan(&mut self) -> ScanReport {
        let report = self.scanner.scan().await;
        let points = self.assembler.events(&report.records);
        self.dispatcher.dispatch(points, "event_log");

        if report.failed_logs.is_empty() {
            tracing::info!(
                new_events = report.records.len(),
                already_seen = report.already_seen,
                undecodable = report.undecodable,
                latest = ?report.latest,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Event log scan complete"
            );
        } else {
            tracing::warn!(
                new_events = report.records.len(),
                failed_logs = ?report.failed_logs,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Event log scan partially failed"
            );
        }

        self.backoff.record(report.elapsed);
        report
    }
}

#[async_trait]
impl Job for EventLogJob {
    fn name(&self) -> &'static str {
        "event_log"
    }

    fn interval(&self) -> Duration {
        self.backoff.interval()
    }

    async fn on_start(&mut self) {
        self.scanner.prune_checkpoints().await;
    }

    async fn run(&mut self) {
        self.scan().await;
    }
}
