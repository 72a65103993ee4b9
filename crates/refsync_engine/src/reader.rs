//! Reassembling published databases.

use crate::error::{SyncError, SyncResult};
use md5::{Digest, Md5};
use refsync_store::{ChunkStore, DatabaseName, StateStore, SyncMetadata};

/// Reads the published generation of `name` and verifies it.
///
/// Returns `None` if the database was never published.
///
/// # Errors
///
/// Returns [`SyncError::Corrupted`] if a chunk of the published range is
/// missing or the payload does not hash to the published checksum.
pub fn retrieve_database<S, K>(state: &S, chunks: &K, name: &DatabaseName) -> SyncResult<Option<Vec<u8>>>
where
    S: StateStore + ?Sized,
    K: ChunkStore + ?Sized,
{
    let snapshot = state.read()?;
    match snapshot.catalog.get(name.as_str()) {
        Some(metadata) => read_generation(chunks, name, metadata).map(Some),
        None => Ok(None),
    }
}

/// Concatenates and verifies the chunks `metadata` describes.
///
/// # Errors
///
/// See [`retrieve_database`].
pub fn read_generation<K>(chunks: &K, name: &DatabaseName, metadata: &SyncMetadata) -> SyncResult<Vec<u8>>
where
    K: ChunkStore + ?Sized,
{
    let mut payload = Vec::new();
    let mut hasher = Md5::new();

    for index in metadata.chunk_indices() {
        let data = chunks.read_chunk(name, index)?.ok_or_else(|| SyncError::Corrupted {
            name: name.to_string(),
            reason: format!("missing chunk {}", index),
        })?;
        hasher.update(&data);
        payload.extend_from_slice(&data);
    }

    let actual = hex::encode(hasher.finalize());
    if actual != metadata.checksum {
        return Err(SyncError::Corrupted {
            name: name.to_string(),
            reason: format!("checksum {} does not match published {}", actual, metadata.checksum),
        });
    }
    Ok(payload)
}
