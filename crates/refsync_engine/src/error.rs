//! Error types for the sync engine.

use refsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Reading a content stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The downloaded content does not hash to the advertised checksum.
    #[error("md5 checksum mismatch, expected [{expected}], actual [{actual}]")]
    ChecksumMismatch {
        /// Checksum advertised by the catalog.
        expected: String,
        /// Checksum computed over the received bytes.
        actual: String,
    },

    /// The catalog manifest could not be parsed.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Metadata or chunk store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A published database failed verification on read.
    #[error("database {name} is corrupted: {reason}")]
    Corrupted {
        /// Database name.
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A background sync task panicked or was aborted.
    #[error("sync task failed: {0}")]
    TaskFailed(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next scheduled cycle may succeed where this one
    /// failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Io(_) | SyncError::Timeout | SyncError::ChecksumMismatch { .. } => true,
            SyncError::Store(e) => e.is_conflict() || matches!(e, StoreError::Io(_)),
            _ => false,
        }
    }

    /// Returns true if this error is a lost metadata publish race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_conflict())
    }
}
