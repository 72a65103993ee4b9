//! Sync command implementation.

use refsync_engine::{
    FileClient, LocalLease, SyncConfig, SyncCycleResult, SyncOutcome, SyncScheduler,
};
use refsync_store::DirStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for the sync command.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum chunk size in bytes.
    pub chunk_size: usize,
    /// Parallel database workers.
    pub workers: usize,
    /// Run periodically until interrupted.
    pub watch: bool,
    /// Interval between cycles when watching.
    pub interval: Duration,
}

/// Runs the sync command.
pub fn run(path: &Path, manifest: &Path, options: &SyncOptions) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = fs::canonicalize(manifest)
        .map_err(|e| format!("Cannot read manifest {:?}: {}", manifest, e))?;
    let base_dir = manifest
        .parent()
        .ok_or_else(|| format!("Manifest {:?} has no parent directory", manifest))?;

    let config = SyncConfig::new(manifest.display().to_string())
        .with_max_chunk_size(options.chunk_size)
        .with_workers(options.workers)
        .with_poll_interval(options.interval);
    let store = Arc::new(DirStore::open(path, true)?);
    let scheduler = Arc::new(SyncScheduler::new(
        config,
        Arc::new(FileClient::new(base_dir)),
        Arc::clone(&store),
        store,
        Arc::new(LocalLease::default()),
    )?);

    if options.watch {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async move {
            let (tx, rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for interrupts");
                }
                info!("stopping");
                let _ = tx.send(true);
            });
            scheduler.run(rx).await
        })?;
        return Ok(());
    }

    println!("Synchronizing from {:?}", manifest);
    println!();

    let result = scheduler
        .run_cycle()?
        .ok_or("Sync cycle did not run")?;
    print_result(&result);

    println!();
    if result.failed() == 0 {
        println!("✓ {} database(s) synchronized", result.succeeded());
        Ok(())
    } else {
        println!("✗ {} database(s) failed", result.failed());
        Err("Sync failed".into())
    }
}

fn print_result(result: &SyncCycleResult) {
    for report in &result.reports {
        match &report.result {
            Ok(SyncOutcome::Touched(metadata)) => {
                println!("  {}: up to date ({} chunks)", report.name, metadata.chunk_count());
            }
            Ok(SyncOutcome::Created { metadata, .. }) => {
                println!(
                    "  {}: created, chunks {}..={}",
                    report.name, metadata.first_chunk_index, metadata.last_chunk_index
                );
            }
            Ok(SyncOutcome::Updated {
                metadata,
                deleted_chunks,
            }) => {
                println!(
                    "  {}: updated, chunks {}..={}, {} stale chunk(s) removed",
                    report.name, metadata.first_chunk_index, metadata.last_chunk_index, deleted_chunks
                );
            }
            Err(e) => println!("  {}: FAILED: {}", report.name, e),
        }
    }
    for name in &result.skipped {
        println!("  {}: skipped", name);
    }
    println!("Completed in {:?}", result.duration);
}
