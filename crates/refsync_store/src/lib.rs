//! # refsync Store
//!
//! Storage interfaces and reference implementations for refsync.
//!
//! refsync keeps two kinds of durable state for every reference database it
//! synchronizes:
//!
//! - **Chunks** - bounded-size slices of the database content, addressed by
//!   `(database name, absolute chunk index)`
//! - **Sync metadata** - one record per database naming the chunk range of
//!   the current generation and its checksum
//!
//! Both are owned by external collaborators in production. This crate
//! defines the traits the engine consumes and ships reference
//! implementations of them.
//!
//! ## Design Principles
//!
//! - Chunk stores are **opaque byte stores** - they never interpret payloads
//! - The metadata catalog is read and replaced as a single versioned snapshot
//! - Metadata is never mutated in place; a publish swaps in a new value only
//!   if the caller saw the latest version of that database
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStateStore`] / [`MemoryChunkStore`] - for tests and embedding
//! - [`DirStore`] - a directory-backed store implementing both traits
//!
//! ## Example
//!
//! ```rust
//! use refsync_store::{DatabaseName, MemoryStateStore, StateStore, SyncMetadata};
//!
//! let store = MemoryStateStore::new();
//! let snapshot = store.read().unwrap();
//! let name = DatabaseName::new("city");
//! let version = store
//!     .publish(&name, SyncMetadata::new(0, 3, "abc", 0), snapshot.version)
//!     .unwrap();
//! assert_eq!(version, snapshot.version + 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod memory;
mod store;
mod types;

pub use dir::DirStore;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryChunkStore, MemoryStateStore};
pub use store::{ChunkStore, StateStore};
pub use types::{Chunk, ChunkIndex, ChunkKey, DatabaseName, SyncCatalog, SyncMetadata, VersionedCatalog};
