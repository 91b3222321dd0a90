//! Incremental event-log scanner.
//!
//! One scan cycle:
//!
//! 1. Load each configured kind's checkpoint, seeding absent ones to
//!    `now - lookback`.
//! 2. Group kinds by log and query each log once, from the oldest checkpoint
//!    in the group.
//! 3. Classify entries by `(event id, provider)`, dropping unmonitored ones.
//! 4. Accept an entry only if it is strictly newer than its own kind's
//!    checkpoint.
//! 5. Advance each kind's checkpoint to its newest accepted entry.
//!
//! A failing log query or undecodable entry is logged and skipped; the rest
//! of the cycle proceeds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::eventlog::{EventKind, EventLogSource, EventRecord, LogName};
use crate::storage::CheckpointStore;

/// Default history read for a kind that has never been scanned.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted lookback (365 days).
pub const MAX_LOOKBACK: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Outcome of one scan cycle.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Newly accepted events, oldest first.
    pub records: Vec<EventRecord>,
    /// Newest accepted timestamp across all kinds (diagnostics only).
    pub latest: Option<DateTime<Utc>>,
    /// Logs whose query failed this cycle.
    pub failed_logs: Vec<LogName>,
    /// Entries that could not be decoded.
    pub undecodable: usize,
    /// Entries of monitored kinds at or before their checkpoint.
    pub already_seen: usize,
    /// Wall-clock duration of the cycle.
    pub elapsed: Duration,
}

/// Scanner over a fixed set of event kinds.
pub struct EventLogScanner {
    source: Arc<dyn EventLogSource>,
    store: Arc<dyn CheckpointStore>,
    kinds: BTreeSet<EventKind>,
    lookback: chrono::Duration,
}

impl std::fmt::Debug for EventLogScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogScanner")
            .field("kinds", &self.kinds)
            .field("lookback", &self.lookback)
            .finish_non_exhaustive()
    }
}

impl EventLogScanner {
    /// Create a scanner for `kinds` with the default 24h lookback.
    pub fn new(
        source: Arc<dyn EventLogSource>,
        store: Arc<dyn CheckpointStore>,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> Self {
        Self {
            source,
            store,
            kinds: kinds.into_iter().collect(),
            lookback: chrono::Duration::from_std(DEFAULT_LOOKBACK)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
        }
    }

    /// Set the lookback used to seed absent checkpoints, capped at [`MAX_LOOKBACK`].
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        let lookback = if lookback > MAX_LOOKBACK {
            tracing::warn!(?lookback, max = ?MAX_LOOKBACK, "Lookback too long, capping");
            MAX_LOOKBACK
        } else {
            lookback
        };
        match chrono::Duration::from_std(lookback) {
            Ok(lookback) => self.lookback = lookback,
            Err(_) => tracing::warn!(?lookback, "Lookback out of range, keeping previous value"),
        }
        self
    }

    /// Monitored kinds.
    pub fn kinds(&self) -> &BTreeSet<EventKind> {
        &self.kinds
    }

    /// Remove checkpoints of kinds that are no longer monitored.
    ///
    /// Run once at startup. Failure is logged and reported as zero removals.
    pub async fn prune_checkpoints(&self) -> u64 {
        match self.store.prune_unknown_kinds(&self.kinds).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Pruned checkpoints of unmonitored event kinds");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prune event checkpoints");
                0
            }
        }
    }

    /// Run one scan cycle at the current time.
    pub async fn scan(&self) -> ScanReport {
        self.scan_at(Utc::now()).await
    }

    /// Run one scan cycle treating `now` as the current time.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> ScanReport {
        let started = Instant::now();
        let mut report = ScanReport::default();

        let checkpoints = self.load_checkpoints(now).await;

        let mut batches: BTreeMap<LogName, Vec<EventKind>> = BTreeMap::new();
        for kind in &self.kinds {
            batches.entry(kind.log()).or_default().push(*kind);
        }

        let mut newest: BTreeMap<EventKind, DateTime<Utc>> = BTreeMap::new();
        for (log, kinds) in &batches {
            // Oldest checkpoint in the batch, so no kind misses events.
            let Some(lower) = kinds.iter().filter_map(|k| checkpoints.get(k)).min().copied()
            else {
                continue;
            };
            let event_ids: Vec<u32> = kinds.iter().map(|k| k.event_id()).collect();

            let entries = match self.source.fetch(*log, lower, &event_ids).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(log = %log, error = %e, "Event log query failed, skipping batch");
                    report.failed_logs.push(*log);
                    continue;
                }
            };
            tracing::debug!(log = %log, since = %lower, entries = entries.len(), "Event log batch fetched");

            for entry in entries {
                let raw = match entry {
                    Ok(raw) => raw,
                    Err(e) => {
                        report.undecodable += 1;
                        tracing::debug!(log = %log, error = %e, "Skipping undecodable event");
                        continue;
                    }
                };

                let Some(kind) = kinds
                    .iter()
                    .copied()
                    .find(|k| k.matches(raw.event_id, &raw.provider))
                else {
                    continue;
                };

                let Some(checkpoint) = checkpoints.get(&kind) else {
                    continue;
                };
                if raw.occurred_at <= *checkpoint {
                    report.already_seen += 1;
                    continue;
                }

                newest
                    .entry(kind)
                    .and_modify(|ts| *ts = (*ts).max(raw.occurred_at))
                    .or_insert(raw.occurred_at);
                report.records.push(EventRecord::from_raw(kind, raw));
            }
        }

        for (kind, ts) in &newest {
            let advances = checkpoints.get(kind).is_none_or(|current| ts > current);
            if !advances {
                continue;
            }
            if let Err(e) = self.store.set_checkpoint(*kind, *ts).await {
                tracing::warn!(kind = %kind, error = %e, "Failed to advance event checkpoint");
            }
        }

        report.records.sort_by_key(|r| r.occurred_at);
        report.latest = newest.values().max().copied();
        report.elapsed = started.elapsed();

        if report.undecodable > 0 {
            tracing::warn!(count = report.undecodable, "Skipped undecodable events");
        }
        tracing::debug!(
            accepted = report.records.len(),
            already_seen = report.already_seen,
            failed_logs = report.failed_logs.len(),
            latest = ?report.latest,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Event log scan cycle finished"
        );
        report
    }

    /// Seed for absent checkpoints. Falls back to the default lookback, then to
    /// `now`, when the subtraction leaves chrono's range.
    fn seed_for(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(seed) = now.checked_sub_signed(self.lookback) {
            return seed;
        }
        tracing::warn!(lookback = %self.lookback, now = %now, "Lookback out of range, using default");
        chrono::Duration::from_std(DEFAULT_LOOKBACK)
            .ok()
            .and_then(|default| now.checked_sub_signed(default))
            .unwrap_or(now)
    }

    /// Current checkpoint per kind, seeding absent ones.
    ///
    /// A storage read failure is treated as an absent checkpoint.
    async fn load_checkpoints(&self, now: DateTime<Utc>) -> BTreeMap<EventKind, DateTime<Utc>> {
        let seed = self.seed_for(now);
        let mut checkpoints = BTreeMap::new();

        for kind in &self.kinds {
            let stored = match self.store.get_checkpoint(*kind).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Checkpoint read failed, treating as absent");
                    None
                }
            };

            let checkpoint = match stored {
                Some(ts) => ts,
                None => {
                    tracing::info!(kind = %kind, seed = %seed, "Seeding event checkpoint from lookback");
                    if let Err(e) = self.store.set_checkpoint(*kind, seed).await {
                        tracing::warn!(kind = %kind, error = %e, "Failed to persist seeded checkpoint");
                    }
                    seed
                }
            };
            checkpoints.insert(*kind, checkpoint);
        }

        checkpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::{RawEvent, ScanError};
    use crate::storage::{MemoryCheckpointStore, StorageError};
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Event log fake: canned entries per log, optional failing logs, and a
    /// record of every query issued.
    #[derive(Default)]
    struct ScriptedLog {
        entries: BTreeMap<LogName, Vec<Result<RawEvent, String>>>,
        failing: BTreeSet<LogName>,
        queries: Mutex<Vec<(LogName, DateTime<Utc>)>>,
    }

    impl ScriptedLog {
        fn with(mut self, log: LogName, event: RawEvent) -> Self {
            self.entries.entry(log).or_default().push(Ok(event));
            self
        }

        fn with_garbage(mut self, log: LogName) -> Self {
            self.entries
                .entry(log)
                .or_default()
                .push(Err("truncated json".into()));
            self
        }

        fn failing(mut self, log: LogName) -> Self {
            self.failing.insert(log);
            self
        }
    }

    #[async_trait::async_trait]
    impl EventLogSource for ScriptedLog {
        async fn fetch(
            &self,
            log: LogName,
            since: DateTime<Utc>,
            _event_ids: &[u32],
        ) -> Result<Vec<Result<RawEvent, ScanError>>, ScanError> {
            self.queries.lock().unwrap().push((log, since));
            if self.failing.contains(&log) {
                return Err(ScanError::Query("access denied".into()));
            }
            Ok(self
                .entries
                .get(&log)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| e.as_ref().map_or(true, |raw| raw.occurred_at >= since))
                        .map(|e| e.clone().map_err(ScanError::Decode))
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    /// Store whose reads and writes always fail.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl CheckpointStore for BrokenStore {
        async fn get_checkpoint(
            &self,
            _kind: EventKind,
        ) -> Result<Option<DateTime<Utc>>, StorageError> {
            Err(StorageError::InvalidData("disk on fire".into()))
        }

        async fn set_checkpoint(
            &self,
            _kind: EventKind,
            _ts: DateTime<Utc>,
        ) -> Result<(), StorageError> {
            Err(StorageError::InvalidData("disk on fire".into()))
        }

        async fn prune_unknown_kinds(
            &self,
            _allowed: &BTreeSet<EventKind>,
        ) -> Result<u64, StorageError> {
            Err(StorageError::InvalidData("disk on fire".into()))
        }
    }

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn hours(h: i64) -> chrono::Duration {
        chrono::Duration::hours(h)
    }

    fn event(kind: EventKind, at: DateTime<Utc>) -> RawEvent {
        RawEvent {
            event_id: kind.event_id(),
            provider: kind.provider().to_string(),
            occurred_at: at,
            message: format!("{kind} at {at}"),
        }
    }

    fn scanner(
        log: ScriptedLog,
        store: Arc<dyn CheckpointStore>,
        kinds: &[EventKind],
    ) -> (EventLogScanner, Arc<ScriptedLog>) {
        let log = Arc::new(log);
        let scanner = EventLogScanner::new(log.clone(), store, kinds.iter().copied());
        (scanner, log)
    }

    #[tokio::test]
    async fn test_first_scan_seeds_every_kind_to_lookback() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (scanner, _) = scanner(ScriptedLog::default(), store.clone(), &EventKind::ALL);

        let report = scanner.scan_at(t()).await;

        assert!(report.records.is_empty());
        assert_eq!(report.latest, None);
        for kind in EventKind::ALL {
            assert_eq!(
                store.get_checkpoint(kind).await.unwrap(),
                Some(t() - hours(24))
            );
        }
    }

    #[tokio::test]
    async fn test_accepts_only_events_after_checkpoint() {
        let kind = EventKind::ApplicationError;
        let store = Arc::new(MemoryCheckpointStore::new());
        store.set_checkpoint(kind, t()).await.unwrap();

        let log = ScriptedLog::default()
            .with(LogName::Application, event(kind, t() - hours(1)))
            .with(LogName::Application, event(kind, t()))
            .with(LogName::Application, event(kind, t() + hours(1)))
            .with(LogName::Application, event(kind, t() + hours(2)));
        let (scanner, _) = scanner(log, store.clone(), &[kind]);

        let report = scanner.scan_at(t() + hours(3)).await;

        let times: Vec<_> = report.records.iter().map(|r| r.occurred_at).collect();
        assert_eq!(times, vec![t() + hours(1), t() + hours(2)]);
        assert_eq!(report.latest, Some(t() + hours(2)));
        assert_eq!(
            store.get_checkpoint(kind).await.unwrap(),
            Some(t() + hours(2))
        );
    }

    #[tokio::test]
    async fn test_repeated_scan_emits_nothing_new() {
        let kind = EventKind::ApplicationHang;
        let store = Arc::new(MemoryCheckpointStore::new());
        store.set_checkpoint(kind, t()).await.unwrap();
        let log = ScriptedLog::default().with(LogName::Application, event(kind, t() + hours(1)));
        let (scanner, _) = scanner(log, store, &[kind]);

        assert_eq!(scanner.scan_at(t() + hours(2)).await.records.len(), 1);
        let second = scanner.scan_at(t() + hours(3)).await;
        assert!(second.records.is_empty());
        assert_eq!(second.already_seen, 1);
    }

    #[tokio::test]
    async fn test_batch_queries_from_oldest_checkpoint_but_dedups_per_kind() {
        let store = Arc::new(MemoryCheckpointStore::new());
        store
            .set_checkpoint(EventKind::SystemBugcheck, t() - hours(10))
            .await
            .unwrap();
        store
            .set_checkpoint(EventKind::UnexpectedShutdown, t())
            .await
            .unwrap();

        let log = ScriptedLog::default()
            .with(LogName::System, event(EventKind::SystemBugcheck, t() - hours(5)))
            .with(LogName::System, event(EventKind::UnexpectedShutdown, t() - hours(5)))
            .with(LogName::System, event(EventKind::UnexpectedShutdown, t() + hours(1)));
        let (scanner, log) = scanner(
            log,
            store.clone(),
            &[EventKind::SystemBugcheck, EventKind::UnexpectedShutdown],
        );

        let report = scanner.scan_at(t() + hours(2)).await;

        assert_eq!(
            *log.queries.lock().unwrap(),
            vec![(LogName::System, t() - hours(10))]
        );
        let accepted: Vec<_> = report
            .records
            .iter()
            .map(|r| (r.kind, r.occurred_at))
            .collect();
        assert_eq!(
            accepted,
            vec![
                (EventKind::SystemBugcheck, t() - hours(5)),
                (EventKind::UnexpectedShutdown, t() + hours(1)),
            ]
        );
        assert_eq!(
            store
                .get_checkpoint(EventKind::SystemBugcheck)
                .await
                .unwrap(),
            Some(t() - hours(5))
        );
        assert_eq!(
            store
                .get_checkpoint(EventKind::UnexpectedShutdown)
                .await
                .unwrap(),
            Some(t() + hours(1))
        );
    }

    #[tokio::test]
    async fn test_one_query_per_log() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (scanner, log) = scanner(ScriptedLog::default(), store, &EventKind::ALL);
        scanner.scan_at(t()).await;

        let logs: Vec<_> = log.queries.lock().unwrap().iter().map(|q| q.0).collect();
        assert_eq!(logs, vec![LogName::Application, LogName::System]);
    }

    #[tokio::test]
    async fn test_unmonitored_events_are_discarded() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let stray = RawEvent {
            event_id: 7036,
            provider: "Service Control Manager".into(),
            occurred_at: t() - hours(1),
            message: "service entered the running state".into(),
        };
        // Right id, wrong provider.
        let imposter = RawEvent {
            provider: "Some Other Provider".into(),
            ..event(EventKind::UnexpectedShutdown, t() - hours(1))
        };
        let log = ScriptedLog::default()
            .with(LogName::System, stray)
            .with(LogName::System, imposter)
            // Monitored kind, but not configured for this scanner.
            .with(LogName::System, event(EventKind::SystemBugcheck, t() - hours(1)));
        let (scanner, _) = scanner(log, store.clone(), &[EventKind::UnexpectedShutdown]);

        let report = scanner.scan_at(t()).await;

        assert!(report.records.is_empty());
        assert_eq!(
            store
                .get_checkpoint(EventKind::UnexpectedShutdown)
                .await
                .unwrap(),
            Some(t() - hours(24))
        );
        assert_eq!(
            store
                .get_checkpoint(EventKind::SystemBugcheck)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let store = Arc::new(MemoryCheckpointStore::new());
        for kind in EventKind::ALL {
            store.set_checkpoint(kind, t()).await.unwrap();
        }
        let log = ScriptedLog::default()
            .failing(LogName::Application)
            .with(LogName::System, event(EventKind::SystemBugcheck, t() + hours(1)))
            .with(LogName::System, event(EventKind::UnexpectedShutdown, t() + hours(2)))
            .with(LogName::System, event(EventKind::UnexpectedShutdown, t() + hours(3)));
        let (scanner, _) = scanner(log, store.clone(), &EventKind::ALL);

        let report = scanner.scan_at(t() + hours(4)).await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.failed_logs, vec![LogName::Application]);
        for kind in [EventKind::ApplicationError, EventKind::ApplicationHang] {
            assert_eq!(store.get_checkpoint(kind).await.unwrap(), Some(t()));
        }
        assert_eq!(
            store
                .get_checkpoint(EventKind::UnexpectedShutdown)
                .await
                .unwrap(),
            Some(t() + hours(3))
        );
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_counted_and_skipped() {
        let kind = EventKind::ApplicationError;
        let store = Arc::new(MemoryCheckpointStore::new());
        store.set_checkpoint(kind, t()).await.unwrap();
        let log = ScriptedLog::default()
            .with(LogName::Application, event(kind, t() + hours(1)))
            .with_garbage(LogName::Application)
            .with(LogName::Application, event(kind, t() + hours(2)));
        let (scanner, _) = scanner(log, store, &[kind]);

        let report = scanner.scan_at(t() + hours(3)).await;
        assert_eq!(report.undecodable, 1);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_lookback() {
        let kind = EventKind::ApplicationHang;
        let log = ScriptedLog::default()
            .with(LogName::Application, event(kind, t() - hours(30)))
            .with(LogName::Application, event(kind, t() - hours(2)));
        let (scanner, log) = scanner(log, Arc::new(BrokenStore), &[kind]);

        let report = scanner.scan_at(t()).await;

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].occurred_at, t() - hours(2));
        assert_eq!(
            *log.queries.lock().unwrap(),
            vec![(LogName::Application, t() - hours(24))]
        );
        assert_eq!(scanner.prune_checkpoints().await, 0);
    }

    #[tokio::test]
    async fn test_custom_lookback() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (scanner, _) = scanner(
            ScriptedLog::default(),
            store.clone(),
            &[EventKind::SystemBugcheck],
        );
        let scanner = scanner.with_lookback(Duration::from_secs(3600));
        scanner.scan_at(t()).await;
        assert_eq!(
            store
                .get_checkpoint(EventKind::SystemBugcheck)
                .await
                .unwrap(),
            Some(t() - hours(1))
        );
    }

    #[tokio::test]
    async fn test_oversized_lookback_is_capped() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (scanner, _) = scanner(
            ScriptedLog::default(),
            store.clone(),
            &[EventKind::UnexpectedShutdown],
        );
        // 1_000_000 years fits chrono::Duration but not a date subtraction.
        let scanner = scanner.with_lookback(Duration::from_secs(31_557_600_000_000));

        scanner.scan_at(t()).await;

        assert_eq!(
            store
                .get_checkpoint(EventKind::UnexpectedShutdown)
                .await
                .unwrap(),
            Some(t() - chrono::Duration::days(365))
        );
    }

    #[tokio::test]
    async fn test_seed_near_min_date_does_not_panic() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (scanner, _) = scanner(
            ScriptedLog::default(),
            store.clone(),
            &[EventKind::ApplicationError],
        );
        let now = DateTime::<Utc>::MIN_UTC + hours(1);

        let report = scanner.scan_at(now).await;

        assert!(report.records.is_empty());
        assert_eq!(
            store
                .get_checkpoint(EventKind::ApplicationError)
                .await
                .unwrap(),
            Some(now)
        );
    }

    #[tokio::test]
    async fn test_prune_removes_unconfigured_kinds() {
        let store = Arc::new(MemoryCheckpointStore::new());
        for kind in EventKind::ALL {
            store.set_checkpoint(kind, t()).await.unwrap();
        }
        let (scanner, _) = scanner(
            ScriptedLog::default(),
            store.clone(),
            &[EventKind::ApplicationError],
        );
        assert_eq!(scanner.prune_checkpoints().await, 3);
        assert_eq!(
            store
                .get_checkpoint(EventKind::ApplicationHang)
                .await
                .unwrap(),
            None
        );
    }
}
