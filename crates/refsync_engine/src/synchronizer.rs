//! Per-database synchronization.
//!
//! A database moves through three shapes of run:
//!
//! - **Touch**: the catalog checksum equals the published one. Only the
//!   timestamp is republished; nothing is downloaded, written or deleted.
//! - **Create**: no metadata exists yet. Chunks are written from index 0.
//! - **Update**: the checksum changed. Chunks are written starting right after
//!   the previous generation's last chunk, so the old generation stays intact
//!   and readable until the new metadata replaces it.
//!
//! The metadata publish is the only point where readers can observe a new
//! generation, and it happens after every chunk write was acknowledged.
//! Stale chunks are deleted strictly after a successful publish.

use crate::catalog::RemoteDescriptor;
use crate::checksum::index_and_verify;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::http::HttpClient;
use refsync_store::{ChunkStore, StateStore, SyncMetadata};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// What a synchronization run did to one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content unchanged; only the timestamp was republished.
    Touched(SyncMetadata),
    /// First generation published.
    Created {
        /// The published metadata.
        metadata: SyncMetadata,
        /// Stale chunks removed after publish.
        deleted_chunks: u64,
    },
    /// A new generation replaced the previous one.
    Updated {
        /// The published metadata.
        metadata: SyncMetadata,
        /// Stale chunks removed after publish.
        deleted_chunks: u64,
    },
}

impl SyncOutcome {
    /// Returns the metadata published by the run.
    pub fn metadata(&self) -> &SyncMetadata {
        match self {
            SyncOutcome::Touched(metadata)
            | SyncOutcome::Created { metadata, .. }
            | SyncOutcome::Updated { metadata, .. } => metadata,
        }
    }

    /// Returns true if content was transferred.
    pub fn transferred(&self) -> bool {
        !matches!(self, SyncOutcome::Touched(_))
    }
}

/// Returns the current time in epoch milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Synchronizes single databases against the stores.
///
/// Borrowed collaborators make the synchronizer cheap to build per cycle.
pub struct DatabaseSynchronizer<'a, C: ?Sized, S: ?Sized, K: ?Sized> {
    client: &'a C,
    state: &'a S,
    chunks: &'a K,
    config: &'a SyncConfig,
    clock: fn() -> u64,
}

impl<'a, C, S, K> DatabaseSynchronizer<'a, C, S, K>
where
    C: HttpClient + ?Sized,
    S: StateStore + ?Sized,
    K: ChunkStore + ?Sized,
{
    /// Creates a synchronizer.
    pub fn new(client: &'a C, state: &'a S, chunks: &'a K, config: &'a SyncConfig) -> Self {
        Self {
            client,
            state,
            chunks,
            config,
            clock: epoch_millis,
        }
    }

    /// Replaces the timestamp source.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Synchronizes one database against a fresh catalog snapshot.
    ///
    /// # Errors
    ///
    /// Any error leaves the previously published metadata authoritative. A
    /// [`crate::SyncError::Store`] conflict means another writer published
    /// this database first; the database is retried on the next cycle.
    /// Publishes of other databases in between never conflict.
    pub fn synchronize(&self, descriptor: &RemoteDescriptor) -> SyncResult<SyncOutcome> {
        let snapshot = self.state.read()?;
        let prior = snapshot.catalog.get(descriptor.name.as_str());
        self.synchronize_with(descriptor, prior, snapshot.version)
    }

    /// Synchronizes one database given the metadata read at `version`.
    ///
    /// # Errors
    ///
    /// See [`DatabaseSynchronizer::synchronize`].
    pub fn synchronize_with(
        &self,
        descriptor: &RemoteDescriptor,
        prior: Option<&SyncMetadata>,
        version: u64,
    ) -> SyncResult<SyncOutcome> {
        let name = &descriptor.name;

        if let Some(prior) = prior.filter(|p| p.checksum == descriptor.expected_checksum) {
            let metadata = prior.touched((self.clock)());
            self.state.publish(name, metadata.clone(), version)?;
            debug!(database = %name, checksum = %metadata.checksum, "database up to date");
            return Ok(SyncOutcome::Touched(metadata));
        }

        let start_index = prior.map_or(0, SyncMetadata::next_chunk_index);
        info!(
            database = %name,
            url = %descriptor.content_url,
            first_chunk = start_index,
            "downloading database"
        );

        let stream = self
            .client
            .get(&descriptor.content_url, self.config.request_timeout)?;
        let next_index = index_and_verify(
            self.chunks,
            name,
            stream,
            start_index,
            &descriptor.expected_checksum,
            self.config.max_chunk_size,
        )?;

        let metadata = SyncMetadata::new(
            start_index,
            next_index - 1,
            descriptor.expected_checksum.clone(),
            (self.clock)(),
        );
        self.state.publish(name, metadata.clone(), version)?;
        info!(
            database = %name,
            first_chunk = metadata.first_chunk_index,
            last_chunk = metadata.last_chunk_index,
            checksum = %metadata.checksum,
            "published new generation"
        );

        // The new generation is live; a failed cleanup only leaves garbage
        // that the next generation's cleanup also covers.
        let deleted_chunks = match self.chunks.delete_chunks_below(name, start_index) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(database = %name, error = %e, "failed to delete stale chunks");
                0
            }
        };

        Ok(match prior {
            None => SyncOutcome::Created {
                metadata,
                deleted_chunks,
            },
            Some(_) => SyncOutcome::Updated {
                metadata,
                deleted_chunks,
            },
        })
    }
}
