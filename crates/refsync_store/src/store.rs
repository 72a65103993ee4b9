//! Store trait definitions.

use crate::error::StoreResult;
use crate::types::{Chunk, ChunkIndex, DatabaseName, SyncMetadata, VersionedCatalog};
use bytes::Bytes;

/// Durable, cluster-replicated home of the sync metadata catalog.
///
/// # Invariants
///
/// - `read` returns a consistent snapshot and the version it was taken at
/// - `publish` replaces one database's metadata only if that database was
///   not published after `expected_version`, and returns the new version
/// - Publishes of different databases never conflict with each other
/// - A successful publish increments the version by exactly one
///
/// # Implementors
///
/// - [`super::MemoryStateStore`] - For testing
/// - [`super::DirStore`] - Directory-backed snapshot file
pub trait StateStore: Send + Sync {
    /// Reads the current catalog snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    fn read(&self) -> StoreResult<VersionedCatalog>;

    /// Publishes new metadata for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::VersionConflict`] if `name` was
    /// published since `expected_version` was read, or an I/O error.
    fn publish(
        &self,
        name: &DatabaseName,
        metadata: SyncMetadata,
        expected_version: u64,
    ) -> StoreResult<u64>;
}

/// Durable home of chunk records.
///
/// Chunk stores are **opaque byte stores**: they never look inside payloads.
pub trait ChunkStore: Send + Sync {
    /// Writes a chunk, replacing any record already stored under its key.
    ///
    /// The write must be durable when this returns. A record at the same key
    /// can only be left over from an attempt whose metadata was never
    /// published, so overwriting it is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be written.
    fn put_chunk(&self, chunk: &Chunk) -> StoreResult<()>;

    /// Deletes every chunk of `name` with an index strictly below
    /// `first_chunk`. Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_chunks_below(&self, name: &DatabaseName, first_chunk: ChunkIndex) -> StoreResult<u64>;

    /// Reads one chunk payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk exists but cannot be read.
    fn read_chunk(&self, name: &DatabaseName, index: ChunkIndex) -> StoreResult<Option<Bytes>>;
}
