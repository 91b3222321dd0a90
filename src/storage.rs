//! Storage Layer
//!
//! SQLite persistence for event-log checkpoints.
//!
//! # Components
//!
//! - [`SqlitePool`]: Connection pool with embedded migrations
//! - [`CheckpointStore`]: Monotonic per-kind checkpoint contract
//! - [`SqliteCheckpointStore`] / [`MemoryCheckpointStore`]: Durable and process-local implementations

pub mod checkpoint;
pub mod db;
mod error;

pub use checkpoint::{
    CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore, open_checkpoint_store,
};
pub use db::SqlitePool;
pub use error::StorageError;
