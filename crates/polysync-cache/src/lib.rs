//! polysync Cache - Entry tree persistence
//!
//! SQLite-backed storage for:
//! - The canonical entry tree (one row per `SyncEntry`)
//! - Per-adapter item mappings (`AdapterEntryData`), keyed by (entry, adapter)
//!
//! ## Architecture
//!
//! This crate implements the `IEntryRepository` port from `polysync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with schema setup
//! - [`SqliteEntryRepository`] - `IEntryRepository` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use polysync_cache::{DatabasePool, SqliteEntryRepository};
//! use polysync_core::ports::IEntryRepository;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/polysync/entries.db")).await?;
//! let repo = SqliteEntryRepository::new(pool.pool().clone());
//! let tree = repo.load_tree().await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteEntryRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema setup failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be turned back into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
