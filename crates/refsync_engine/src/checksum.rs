//! Chunked indexing with checksum verification.

use crate::chunk::ChunkReader;
use crate::error::{SyncError, SyncResult};
use md5::{Digest, Md5};
use refsync_store::{Chunk, ChunkIndex, ChunkStore, DatabaseName};
use std::io::Read;
use tracing::{debug, warn};

/// Returns the lowercase hex MD5 digest of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Streams `reader` into `store` as chunks of `name` and verifies the
/// content checksum.
///
/// Chunks are written at consecutive indices starting from `start_index`,
/// each acknowledged before the next is read. The MD5 of the raw stream is
/// compared to `expected_checksum` once the stream is exhausted. On success
/// returns the next unused chunk index, so the generation's last chunk is
/// `returned - 1` and an empty stream returns `start_index`.
///
/// Chunks already written are left in place when verification fails; they
/// are unreferenced until some metadata publish covers them, and a later
/// generation's cleanup removes them.
///
/// # Errors
///
/// - [`SyncError::Io`] if reading the stream fails
/// - [`SyncError::Store`] if a chunk write fails
/// - [`SyncError::ChecksumMismatch`] if the digest differs
pub fn index_and_verify<S, R>(
    store: &S,
    name: &DatabaseName,
    reader: R,
    start_index: ChunkIndex,
    expected_checksum: &str,
    max_chunk_size: usize,
) -> SyncResult<ChunkIndex>
where
    S: ChunkStore + ?Sized,
    R: Read,
{
    let mut hasher = Md5::new();
    let mut next_index = start_index;

    for chunk in ChunkReader::new(reader, max_chunk_size) {
        let data = chunk?;
        hasher.update(&data);
        store.put_chunk(&Chunk::new(name.clone(), next_index, data))?;
        next_index += 1;
    }

    let actual = hex::encode(hasher.finalize());
    if actual != expected_checksum {
        warn!(
            database = %name,
            expected = expected_checksum,
            actual = %actual,
            orphaned_chunks = next_index - start_index,
            "checksum mismatch"
        );
        return Err(SyncError::ChecksumMismatch {
            expected: expected_checksum.to_string(),
            actual,
        });
    }

    debug!(
        database = %name,
        first_chunk = start_index,
        chunks = next_index - start_index,
        "indexed and verified"
    );
    Ok(next_index)
}
