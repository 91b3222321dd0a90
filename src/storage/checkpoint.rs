//! Event-log checkpoint persistence.
//!
//! One row per [`EventKind`] holding the timestamp of the newest event already
//! shipped. Writes are monotonic: a checkpoint is only replaced by a strictly
//! later timestamp, so callers can never move it backward.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;

use crate::eventlog::EventKind;
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// Durable mapping of event kind to last-processed timestamp.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    /// Stored checkpoint for `kind`, or `None` if it has never been set.
    async fn get_checkpoint(&self, kind: EventKind) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Upsert the checkpoint for `kind`.
    ///
    /// The stored value becomes `max(previous, ts)`. Calling this with an older
    /// timestamp is a successful no-op.
    async fn set_checkpoint(&self, kind: EventKind, ts: DateTime<Utc>) -> Result<(), StorageError>;

    /// Delete rows for kinds outside `allowed`. Returns the number removed.
    async fn prune_unknown_kinds(&self, allowed: &BTreeSet<EventKind>)
    -> Result<u64, StorageError>;

    /// Release the backing resources. Later calls may fail.
    async fn close(&self) {}
}

/// Open the SQLite store at `path`, degrading to a process-local store.
///
/// Event-log monitoring must not stop the agent, so an unusable database only
/// costs durability: checkpoints are then reseeded from the lookback window on
/// every start.
pub async fn open_checkpoint_store(path: impl AsRef<std::path::Path>) -> Arc<dyn CheckpointStore> {
    let path = path.as_ref();
    match SqlitePool::open(path).await {
        Ok(pool) => {
            tracing::info!(path = %path.display(), "Checkpoint database opened");
            Arc::new(SqliteCheckpointStore::new(pool))
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Checkpoint database unavailable, keeping checkpoints in memory"
            );
            Arc::new(MemoryCheckpointStore::new())
        }
    }
}

/// Encode a timestamp so that lexical order equals chronological order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad checkpoint timestamp '{raw}': {e}")))
}

// =============================================================================
// SQLite
// =============================================================================

/// Checkpoint store backed by the `event_checkpoints` table.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Create a store over an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All persisted rows, including codes no longer known to this build.
    pub async fn list(&self) -> Result<Vec<(i64, DateTime<Utc>)>, StorageError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT kind, last_processed FROM event_checkpoints ORDER BY kind")
                .fetch_all(self.pool.inner())
                .await?;

        rows.into_iter()
            .map(|(kind, raw)| decode_ts(&raw).map(|ts| (kind, ts)))
            .collect()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_checkpoint(&self, kind: EventKind) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_processed FROM event_checkpoints WHERE kind = ?1")
                .bind(kind.code())
                .fetch_optional(self.pool.inner())
                .await?;

        row.map(|(raw,)| decode_ts(&raw)).transpose()
    }

    async fn set_checkpoint(&self, kind: EventKind, ts: DateTime<Utc>) -> Result<(), StorageError> {
        // The WHERE clause keeps the row untouched unless the new value is later.
        sqlx::query(
            r#"
            INSERT INTO event_checkpoints (kind, last_processed)
            VALUES (?1, ?2)
            ON CONFLICT (kind) DO UPDATE SET
                last_processed = excluded.last_processed
            WHERE excluded.last_processed > event_checkpoints.last_processed
            "#,
        )
        .bind(kind.code())
        .bind(encode_ts(ts))
        .execute(self.pool.inner())
        .await?;

        Ok(())
    }

    async fn prune_unknown_kinds(
        &self,
        allowed: &BTreeSet<EventKind>,
    ) -> Result<u64, StorageError> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new("DELETE FROM event_checkpoints");
        if !allowed.is_empty() {
            builder.push(" WHERE kind NOT IN (");
            let mut separated = builder.separated(", ");
            for kind in allowed {
                separated.push_bind(kind.code());
            }
            separated.push_unseparated(")");
        }

        let result = builder.build().execute(self.pool.inner()).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local checkpoint store.
///
/// Used when the database cannot be opened; checkpoints then live only for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    rows: Mutex<BTreeMap<EventKind, DateTime<Utc>>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_checkpoint(&self, kind: EventKind) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.rows.lock().await.get(&kind).copied())
    }

    async fn set_checkpoint(&self, kind: EventKind, ts: DateTime<Utc>) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        let entry = rows.entry(kind).or_insert(ts);
        if ts > *entry {
            *entry = ts;
        }
        Ok(())
    }

    async fn prune_unknown_kinds(
        &self,
        allowed: &BTreeSet<EventKind>,
    ) -> Result<u64, StorageError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|kind, _| allowed.contains(kind));
        Ok((before - rows.len()) as u64)
    }
}
