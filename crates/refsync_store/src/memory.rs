//! In-memory stores for testing.

use crate::error::StoreResult;
use crate::store::{ChunkStore, StateStore};
use crate::types::{Chunk, ChunkIndex, ChunkKey, DatabaseName, SyncMetadata, VersionedCatalog};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory metadata catalog.
///
/// Suitable for:
/// - Unit tests
/// - Integration tests
/// - Single-process embedding where durability is not needed
///
/// # Thread Safety
///
/// Reads and publishes are serialized by an internal lock, so the
/// compare-and-swap in [`StateStore::publish`] is atomic.
///
/// # Example
///
/// ```rust
/// use refsync_store::{MemoryStateStore, StateStore, SyncMetadata};
///
/// let store = MemoryStateStore::new();
/// store.publish(&"asn".into(), SyncMetadata::new(0, 0, "x", 1), 0).unwrap();
///
/// // A second writer holding the old version loses the race
/// assert!(store.publish(&"asn".into(), SyncMetadata::new(1, 1, "y", 2), 0).is_err());
///
/// // Other databases are unaffected
/// store.publish(&"city".into(), SyncMetadata::new(0, 0, "z", 2), 0).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: RwLock<VersionedCatalog>,
    publishes: AtomicU64,
}

impl MemoryStateStore {
    /// Creates an empty store at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-existing snapshot.
    ///
    /// Useful for testing update scenarios.
    #[must_use]
    pub fn with_snapshot(snapshot: VersionedCatalog) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            publishes: AtomicU64::new(0),
        }
    }

    /// Returns the number of successful publishes.
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Returns the metadata currently held for `name`.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<SyncMetadata> {
        self.snapshot.read().catalog.get(name).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self) -> StoreResult<VersionedCatalog> {
        Ok(self.snapshot.read().clone())
    }

    fn publish(
        &self,
        name: &DatabaseName,
        metadata: SyncMetadata,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let mut snapshot = self.snapshot.write();
        *snapshot = snapshot.published(name, metadata, expected_version)?;
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(snapshot.version)
    }
}

/// An in-memory chunk store.
///
/// Besides the chunks themselves it records every deletion request it
/// receives, so tests can assert on cleanup boundaries.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<BTreeMap<ChunkKey, Bytes>>,
    deletions: RwLock<Vec<(DatabaseName, ChunkIndex)>>,
    writes: AtomicU64,
}

impl MemoryChunkStore {
    /// Creates an empty chunk store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of chunk writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the deletion requests received, in order.
    #[must_use]
    pub fn deletions(&self) -> Vec<(DatabaseName, ChunkIndex)> {
        self.deletions.read().clone()
    }

    /// Returns the stored chunk indices of `name`, ascending.
    #[must_use]
    pub fn indices(&self, name: &str) -> Vec<ChunkIndex> {
        self.chunks
            .read()
            .keys()
            .filter(|key| key.database_name.as_str() == name)
            .map(|key| key.chunk_index)
            .collect()
    }

    /// Returns the number of stored chunks across all databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns true if no chunks are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put_chunk(&self, chunk: &Chunk) -> StoreResult<()> {
        self.chunks.write().insert(chunk.key(), chunk.data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_chunks_below(&self, name: &DatabaseName, first_chunk: ChunkIndex) -> StoreResult<u64> {
        self.deletions.write().push((name.clone(), first_chunk));

        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|key, _| !(key.database_name == *name && key.chunk_index < first_chunk));
        Ok((before - chunks.len()) as u64)
    }

    fn read_chunk(&self, name: &DatabaseName, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        Ok(self
            .chunks
            .read()
            .get(&ChunkKey::new(name.clone(), index))
            .cloned())
    }
}
