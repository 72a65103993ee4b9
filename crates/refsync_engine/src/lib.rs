//! # refsync Engine
//!
//! Incremental, checksum-verified synchronization of remote reference
//! databases into chunked local storage.
//!
//! This crate provides:
//! - Chunk splitting of arbitrary-length content streams
//! - Chunked indexing with MD5 verification
//! - Per-database synchronization (touch, create, update)
//! - Catalog manifest retrieval
//! - A periodic scheduler gated by an ownership lease
//! - HTTP client abstraction
//! - Verified reassembly of published databases
//!
//! ## Architecture
//!
//! Each cycle the scheduler fetches the remote catalog and, for every
//! database in it, compares the advertised checksum with the published
//! [`refsync_store::SyncMetadata`]:
//! 1. Unchanged: only the sync timestamp is republished
//! 2. Changed or new: content is streamed into chunks placed after the
//!    previous generation, verified, published, and the old generation is
//!    deleted
//!
//! ## Key Invariants
//!
//! - Metadata is published only after all of its chunks are written
//! - A published generation is never modified
//! - Stale chunks are deleted only after a successful publish
//! - Metadata publishes are compare-and-swap against the snapshot version,
//!   scoped to the database being published
//!
//! ## Example
//!
//! ```rust
//! use refsync_engine::{md5_hex, DatabaseSynchronizer, MockHttpClient, RemoteDescriptor, SyncConfig};
//! use refsync_store::{MemoryChunkStore, MemoryStateStore};
//!
//! let client = MockHttpClient::new();
//! client.set_response("https://example.com/city.mmdb", b"payload".to_vec());
//! let state = MemoryStateStore::new();
//! let chunks = MemoryChunkStore::new();
//! let config = SyncConfig::new("https://example.com/catalog");
//!
//! let descriptor = RemoteDescriptor::new("city", "https://example.com/city.mmdb", md5_hex(b"payload"));
//! let outcome = DatabaseSynchronizer::new(&client, &state, &chunks, &config)
//!     .synchronize(&descriptor)
//!     .unwrap();
//! assert_eq!(outcome.metadata().first_chunk_index, 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod checksum;
mod chunk;
mod config;
mod error;
mod http;
mod reader;
mod scheduler;
mod synchronizer;

pub use catalog::{parse_manifest, CatalogFetcher, RemoteDescriptor};
pub use checksum::{index_and_verify, md5_hex};
pub use chunk::{fill_chunk, next_chunk, ChunkReader};
pub use config::{SyncConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_POLL_INTERVAL, MAX_CHUNK_SIZE_LIMIT};
pub use error::{SyncError, SyncResult};
pub use http::{ContentStream, FileClient, HttpClient, MockHttpClient};
pub use reader::{read_generation, retrieve_database};
pub use scheduler::{
    DatabaseReport, LocalLease, OwnershipLease, SyncCycleResult, SyncScheduler, SyncState,
    SyncStats,
};
pub use synchronizer::{epoch_millis, DatabaseSynchronizer, SyncOutcome};
