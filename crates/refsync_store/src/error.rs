//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A publish was attempted against a stale snapshot.
    #[error("metadata version conflict: expected version {expected}, current version {actual}")]
    VersionConflict {
        /// The version the caller read before publishing.
        expected: u64,
        /// The version currently held by the store.
        actual: u64,
    },

    /// Stored data could not be interpreted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A database name cannot be used as a storage key.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process")]
    Locked,
}

impl StoreError {
    /// Returns true if this error is a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
