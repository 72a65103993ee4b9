//! Export command implementation.

use refsync_engine::retrieve_database;
use refsync_store::{DatabaseName, DirStore};
use std::fs;
use std::path::Path;

/// Runs the export command.
pub fn run(path: &Path, name: &str, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = DirStore::open(path, false)?;
    let name = DatabaseName::new(name);

    let payload = retrieve_database(&store, &store, &name)?
        .ok_or_else(|| format!("Database {} has not been synchronized", name))?;
    fs::write(output, &payload)?;

    println!("Exported {} ({} bytes) to {:?}", name, payload.len(), output);
    Ok(())
}
