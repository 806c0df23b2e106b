//! Error types for the sync engine.

use kvdex_core::CoreError;
use kvdex_storage::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for source table access.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors reported by a [`crate::SourceTable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source rejected the query.
    #[error("query failed: {0}")]
    Query(String),

    /// The table does not exist.
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Index store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Source table error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Indexer error.
    #[error("index error: {0}")]
    Core(#[from] CoreError),

    /// The table has no index schema.
    #[error("no index schema for table {0}")]
    UnknownTable(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_unavailable(),
            SyncError::Source(SourceError::Unavailable(_)) => true,
            SyncError::Core(CoreError::Store(e)) => e.is_unavailable(),
            _ => false,
        }
    }
}
