//! Directory-backed store.
//!
//! Layout:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ state.json        # Versioned metadata catalog
//! └─ chunks/
//!    ├─ city_0.chunk
//!    └─ city_1.chunk
//! ```
//!
//! The LOCK file ensures only one process writes to the directory at a time.
//! `state.json` is replaced atomically (write temp, fsync, rename, fsync dir),
//! so a reader after a crash sees either the old or the new snapshot.

use crate::error::{StoreError, StoreResult};
use crate::store::{ChunkStore, StateStore};
use crate::types::{Chunk, ChunkIndex, DatabaseName, SyncMetadata, VersionedCatalog};
use bytes::Bytes;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const STATE_FILE: &str = "state.json";
const STATE_TEMP: &str = "state.json.tmp";
const CHUNKS_DIR: &str = "chunks";
const CHUNK_EXT: &str = "chunk";

/// A store keeping metadata and chunks in a local directory.
///
/// Implements both [`StateStore`] and [`ChunkStore`]. This is a reference
/// implementation for single-node use and tooling; clustered deployments
/// plug in their own replicated stores.
///
/// # Example
///
/// ```no_run
/// use refsync_store::{DirStore, StateStore};
/// use std::path::Path;
///
/// let store = DirStore::open(Path::new("refsync-data"), true).unwrap();
/// let snapshot = store.read().unwrap();
/// println!("{} databases at version {}", snapshot.catalog.len(), snapshot.version);
/// ```
#[derive(Debug)]
pub struct DirStore {
    path: PathBuf,
    snapshot: Mutex<VersionedCatalog>,
    _lock_file: File,
}

impl DirStore {
    /// Opens a store directory, acquiring its exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The snapshot file is unreadable
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }
        fs::create_dir_all(path.join(CHUNKS_DIR))?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let snapshot = load_snapshot(&path.join(STATE_FILE))?;
        debug!(path = %path.display(), version = snapshot.version, "opened store directory");

        Ok(Self {
            path: path.to_path_buf(),
            snapshot: Mutex::new(snapshot),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn chunks_dir(&self) -> PathBuf {
        self.path.join(CHUNKS_DIR)
    }

    fn chunk_path(&self, name: &DatabaseName, index: ChunkIndex) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self
            .chunks_dir()
            .join(format!("{}_{}.{}", name, index, CHUNK_EXT)))
    }

    fn save_snapshot(&self, snapshot: &VersionedCatalog) -> StoreResult<()> {
        let temp_path = self.path.join(STATE_TEMP);
        let data = serde_json::to_vec_pretty(snapshot)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(STATE_FILE))?;
        sync_directory(&self.path)
    }
}

impl StateStore for DirStore {
    fn read(&self) -> StoreResult<VersionedCatalog> {
        Ok(self.snapshot.lock().clone())
    }

    fn publish(
        &self,
        name: &DatabaseName,
        metadata: SyncMetadata,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let mut snapshot = self.snapshot.lock();
        let next = snapshot.published(name, metadata, expected_version)?;

        // Chunk file names must be durable before metadata points at them
        sync_directory(&self.chunks_dir())?;
        // Only swap the cached snapshot once the file is durable
        self.save_snapshot(&next)?;
        *snapshot = next;
        Ok(snapshot.version)
    }
}

impl ChunkStore for DirStore {
    fn put_chunk(&self, chunk: &Chunk) -> StoreResult<()> {
        let path = self.chunk_path(&chunk.database_name, chunk.chunk_index)?;
        let mut file = File::create(&path)?;
        file.write_all(&chunk.data)?;
        file.sync_all()?;
        Ok(())
    }

    fn delete_chunks_below(&self, name: &DatabaseName, first_chunk: ChunkIndex) -> StoreResult<u64> {
        validate_name(name)?;
        let mut deleted = 0;

        for entry in fs::read_dir(self.chunks_dir())? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some((owner, index)) = file_name.to_str().and_then(parse_chunk_file_name) else {
                continue;
            };
            if owner == name.as_str() && index < first_chunk {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            sync_directory(&self.chunks_dir())?;
        }
        Ok(deleted)
    }

    fn read_chunk(&self, name: &DatabaseName, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        let path = self.chunk_path(name, index)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(Bytes::from(data)))
    }
}

fn load_snapshot(path: &Path) -> StoreResult<VersionedCatalog> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VersionedCatalog::default()),
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Ok(VersionedCatalog::default());
    }
    serde_json::from_slice(&data)
        .map_err(|e| StoreError::Corrupted(format!("{}: {}", path.display(), e)))
}

/// Splits `{name}_{index}.chunk` into its parts.
fn parse_chunk_file_name(file_name: &str) -> Option<(&str, ChunkIndex)> {
    let stem = file_name.strip_suffix(CHUNK_EXT)?.strip_suffix('.')?;
    let (name, index) = stem.rsplit_once('_')?;
    Some((name, index.parse().ok()?))
}

fn validate_name(name: &DatabaseName) -> StoreResult<()> {
    let s = name.as_str();
    if s.is_empty() || s.contains(['/', '\\']) || s == "." || s == ".." {
        return Err(StoreError::InvalidName(s.to_string()));
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StoreResult<()> {
    // NTFS journals directory metadata
    Ok(())
}
