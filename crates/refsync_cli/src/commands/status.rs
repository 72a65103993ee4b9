//! Status command implementation.

use refsync_store::{DirStore, StateStore};
use serde::Serialize;
use std::path::Path;

/// Store status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Store path.
    pub path: String,
    /// Catalog snapshot version.
    pub version: u64,
    /// Published databases, by name.
    pub databases: Vec<DatabaseStatus>,
}

/// Sync metadata of one database.
#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    /// Database name.
    pub name: String,
    /// First chunk of the current generation.
    pub first_chunk_index: i64,
    /// Last chunk of the current generation.
    pub last_chunk_index: i64,
    /// Number of chunks.
    pub chunk_count: u64,
    /// MD5 of the content.
    pub checksum: String,
    /// Last successful sync, epoch milliseconds.
    pub last_synced_at: u64,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = DirStore::open(path, false)?;
    let snapshot = store.read()?;

    let result = StatusResult {
        path: path.display().to_string(),
        version: snapshot.version,
        databases: snapshot
            .catalog
            .iter()
            .map(|(name, metadata)| DatabaseStatus {
                name: name.to_string(),
                first_chunk_index: metadata.first_chunk_index,
                last_chunk_index: metadata.last_chunk_index,
                chunk_count: metadata.chunk_count(),
                checksum: metadata.checksum.clone(),
                last_synced_at: metadata.last_synced_at,
            })
            .collect(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("Store: {}", result.path);
    println!("Catalog version: {}", result.version);
    println!();

    if result.databases.is_empty() {
        println!("No databases synchronized yet");
        return;
    }

    println!(
        "{:<24} {:>8} {:>8} {:>8}  {:<32}  {}",
        "NAME", "FIRST", "LAST", "CHUNKS", "MD5", "SYNCED (ms)"
    );
    for db in &result.databases {
        println!(
            "{:<24} {:>8} {:>8} {:>8}  {:<32}  {}",
            db.name, db.first_chunk_index, db.last_chunk_index, db.chunk_count, db.checksum, db.last_synced_at
        );
    }
}
