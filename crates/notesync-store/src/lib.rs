//! notesync Store - Local item database
//!
//! SQLite-backed implementation of the `LocalStore` port:
//! - Items with tombstones
//! - Change log populated by SQL triggers on local writes
//! - Per-target sync records, sync state and decryption bookkeeping
//! - Resource blobs and their transfer state
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use notesync_store::{DatabasePool, SqliteLocalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/notesync/notesync.db")).await?;
//! let store = SqliteLocalStore::new(pool.pool().clone());
//! // Use store as LocalStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteLocalStore;

use notesync_core::domain::DomainError;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be turned back into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

impl From<DomainError> for StoreError {
    fn from(e: DomainError) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}
