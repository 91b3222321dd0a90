//! Database backend for the checkpoint store.
//!
//! SQLite only. The pool wrapper owns connection options and runs the
//! embedded migrations on connect.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::open("hostwatch.db").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::SqlitePool;
