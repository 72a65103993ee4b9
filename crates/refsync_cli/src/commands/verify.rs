//! Verify command implementation.

use refsync_engine::read_generation;
use refsync_store::{DirStore, StateStore};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let store = DirStore::open(path, false)?;
    let snapshot = store.read()?;

    let mut errors = Vec::new();
    for (name, metadata) in snapshot.catalog.iter() {
        match read_generation(&store, name, metadata) {
            Ok(payload) => println!(
                "  ✓ {}: {} bytes in {} chunk(s)",
                name,
                payload.len(),
                metadata.chunk_count()
            ),
            Err(e) => {
                println!("  ✗ {}: {}", name, e);
                errors.push(name.to_string());
            }
        }
    }

    println!();
    if errors.is_empty() {
        println!("✓ Store verification passed ({} databases)", snapshot.catalog.len());
        Ok(())
    } else {
        println!("✗ Store verification failed: {}", errors.join(", "));
        Err("Verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsync_engine::md5_hex;
    use refsync_store::{Chunk, ChunkStore, SyncMetadata};

    #[test]
    fn detects_missing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DirStore::open(dir.path(), true).unwrap();
            store.put_chunk(&Chunk::new("city".into(), 0, b"abc".to_vec())).unwrap();
            store
                .publish(&"city".into(), SyncMetadata::new(0, 1, md5_hex(b"abcdef"), 0), 0)
                .unwrap();
        }
        assert!(run(dir.path()).is_err());
    }

    #[test]
    fn empty_store_passes() {
        let dir = tempfile::tempdir().unwrap();
        DirStore::open(dir.path(), true).unwrap();
        run(dir.path()).unwrap();
    }
}
