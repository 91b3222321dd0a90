//! Storage-specific error types.
//!
//! Checkpoint operations return [`StorageError`] on failure. Callers in the
//! event-log path treat read failures as "absent" and log write failures.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid data in database (e.g., unparsable timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
