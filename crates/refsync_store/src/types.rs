//! Core data model shared by the stores and the engine.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Absolute index of a chunk within a database's chunk space.
///
/// Signed so that an empty generation can be recorded as
/// `last_chunk_index == first_chunk_index - 1`.
pub type ChunkIndex = i64;

/// Identifier of a remote reference database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Creates a database name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatabaseName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DatabaseName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for DatabaseName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Sync metadata for one database.
///
/// Describes the current generation: the contiguous chunk range
/// `first_chunk_index..=last_chunk_index`, the checksum of the concatenated
/// payload and when it was last confirmed up to date. Values are replaced
/// wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// First chunk of the generation.
    pub first_chunk_index: ChunkIndex,
    /// Last chunk of the generation.
    pub last_chunk_index: ChunkIndex,
    /// Checksum of the reconstructed payload.
    pub checksum: String,
    /// Epoch milliseconds of the last successful sync or touch.
    pub last_synced_at: u64,
}

impl SyncMetadata {
    /// Creates a metadata record.
    pub fn new(
        first_chunk_index: ChunkIndex,
        last_chunk_index: ChunkIndex,
        checksum: impl Into<String>,
        last_synced_at: u64,
    ) -> Self {
        Self {
            first_chunk_index,
            last_chunk_index,
            checksum: checksum.into(),
            last_synced_at,
        }
    }

    /// Returns a copy with only the timestamp replaced.
    #[must_use]
    pub fn touched(&self, last_synced_at: u64) -> Self {
        Self {
            last_synced_at,
            ..self.clone()
        }
    }

    /// Number of chunks in the generation.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        (self.last_chunk_index - self.first_chunk_index + 1).max(0) as u64
    }

    /// First index a replacement generation may use.
    #[must_use]
    pub fn next_chunk_index(&self) -> ChunkIndex {
        self.last_chunk_index + 1
    }

    /// Iterates the chunk indices of the generation.
    pub fn chunk_indices(&self) -> impl Iterator<Item = ChunkIndex> {
        self.first_chunk_index..=self.last_chunk_index
    }
}

/// Mapping of database name to its sync metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCatalog {
    databases: BTreeMap<DatabaseName, SyncMetadata>,
}

impl SyncCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata for a database, if it was ever synced.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SyncMetadata> {
        self.databases.get(name)
    }

    /// Returns a new catalog with `name` mapped to `metadata`.
    #[must_use]
    pub fn with(&self, name: DatabaseName, metadata: SyncMetadata) -> Self {
        let mut databases = self.databases.clone();
        databases.insert(name, metadata);
        Self { databases }
    }

    /// Iterates all entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&DatabaseName, &SyncMetadata)> {
        self.databases.iter()
    }

    /// Number of databases with metadata.
    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    /// Returns true if no database has been synced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

/// A catalog snapshot together with the version it was read at.
///
/// Besides the snapshot-wide version, each database remembers the version
/// its metadata was last published at. Publishes are checked against that
/// per-database revision, so writers of different databases never conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedCatalog {
    /// Snapshot version, incremented by every successful publish.
    pub version: u64,
    /// The catalog contents.
    pub catalog: SyncCatalog,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    revisions: BTreeMap<DatabaseName, u64>,
}

impl VersionedCatalog {
    /// Creates a snapshot at `version`.
    ///
    /// Entries of `catalog` count as published at or before `version`.
    #[must_use]
    pub fn new(version: u64, catalog: SyncCatalog) -> Self {
        Self {
            version,
            catalog,
            revisions: BTreeMap::new(),
        }
    }

    /// Version at which `name` was last published, 0 if never.
    #[must_use]
    pub fn revision(&self, name: &str) -> u64 {
        self.revisions.get(name).copied().unwrap_or(0)
    }

    /// Returns the snapshot that results from publishing `metadata` for
    /// `name` by a writer that read the catalog at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if `name` was published after
    /// `expected_version`, or if `expected_version` is newer than this
    /// snapshot.
    pub fn published(
        &self,
        name: &DatabaseName,
        metadata: SyncMetadata,
        expected_version: u64,
    ) -> StoreResult<Self> {
        if expected_version > self.version || self.revision(name.as_str()) > expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: self.version,
            });
        }

        let version = self.version + 1;
        let mut revisions = self.revisions.clone();
        revisions.insert(name.clone(), version);
        Ok(Self {
            version,
            catalog: self.catalog.with(name.clone(), metadata),
            revisions,
        })
    }
}

/// Storage key of a chunk, rendered as `{name}_{index}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    /// Owning database.
    pub database_name: DatabaseName,
    /// Absolute chunk index.
    pub chunk_index: ChunkIndex,
}

impl ChunkKey {
    /// Creates a chunk key.
    pub fn new(database_name: DatabaseName, chunk_index: ChunkIndex) -> Self {
        Self {
            database_name,
            chunk_index,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.database_name, self.chunk_index)
    }
}

/// A chunk of database content on its way to the chunk store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Owning database.
    pub database_name: DatabaseName,
    /// Absolute chunk index.
    pub chunk_index: ChunkIndex,
    /// Raw payload bytes.
    pub data: Bytes,
}

impl Chunk {
    /// Creates a chunk.
    pub fn new(database_name: DatabaseName, chunk_index: ChunkIndex, data: impl Into<Bytes>) -> Self {
        Self {
            database_name,
            chunk_index,
            data: data.into(),
        }
    }

    /// Returns the storage key of this chunk.
    #[must_use]
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.database_name.clone(), self.chunk_index)
    }
}
