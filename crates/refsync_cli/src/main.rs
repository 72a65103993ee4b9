//! refsync CLI
//!
//! Command-line tools for mirroring reference databases into a local store.
//!
//! # Commands
//!
//! - `sync` - Synchronize databases from a manifest
//! - `status` - Display the published sync metadata
//! - `verify` - Reassemble and verify every published database
//! - `export` - Write a published database to a file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// refsync command-line tools.
#[derive(Parser)]
#[command(name = "refsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize databases listed in a manifest
    Sync {
        /// Manifest file; relative content URLs resolve against its directory
        #[arg(short, long)]
        manifest: PathBuf,

        /// Maximum chunk size in bytes, at most 64 MiB
        #[arg(long, default_value_t = refsync_engine::DEFAULT_MAX_CHUNK_SIZE)]
        chunk_size: usize,

        /// Number of databases synchronized in parallel
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Keep running, one cycle per interval, until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between cycles with --watch
        #[arg(long, default_value = "3600")]
        interval: u64,
    },

    /// Display the published sync metadata
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reassemble and verify every published database
    Verify,

    /// Write a published database to a file
    Export {
        /// Database name
        name: String,

        /// Output file
        output: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            manifest,
            chunk_size,
            workers,
            watch,
            interval,
        } => {
            let path = cli.data_dir.ok_or("Data directory required for sync")?;
            let options = commands::sync::SyncOptions {
                chunk_size,
                workers,
                watch,
                interval: std::time::Duration::from_secs(interval),
            };
            commands::sync::run(&path, &manifest, &options)?;
        }
        Commands::Status { format } => {
            let path = cli.data_dir.ok_or("Data directory required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.data_dir.ok_or("Data directory required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Export { name, output } => {
            let path = cli.data_dir.ok_or("Data directory required for export")?;
            commands::export::run(&path, &name, &output)?;
        }
        Commands::Version => {
            println!("refsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
