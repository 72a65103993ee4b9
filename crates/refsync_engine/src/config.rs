//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Default maximum chunk size (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest accepted chunk size (64 MiB).
///
/// Chunks are buffered in memory while indexing, one per worker.
pub const MAX_CHUNK_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Default interval between sync cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// URL of the catalog manifest.
    pub catalog_endpoint: String,
    /// Query parameters appended to the catalog request.
    pub catalog_query: Vec<(String, String)>,
    /// Interval between scheduled cycles.
    pub poll_interval: Duration,
    /// Whether scheduled cycles run at all.
    pub enabled: bool,
    /// Maximum size of a stored chunk in bytes.
    pub max_chunk_size: usize,
    /// Number of databases synchronized in parallel within one cycle.
    pub workers: usize,
    /// Timeout applied to every network request.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(catalog_endpoint: impl Into<String>) -> Self {
        Self {
            catalog_endpoint: catalog_endpoint.into(),
            catalog_query: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            enabled: true,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            workers: 1,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Adds a query parameter to the catalog request.
    pub fn with_catalog_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.catalog_query.push((key.into(), value.into()));
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enables or disables scheduled cycles.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum chunk size.
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Sets the number of parallel database workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the catalog URL including query parameters.
    pub fn catalog_url(&self) -> String {
        if self.catalog_query.is_empty() {
            return self.catalog_endpoint.clone();
        }

        let query = self
            .catalog_query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.catalog_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}{}", self.catalog_endpoint, separator, query)
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.catalog_endpoint.is_empty() {
            return Err(SyncError::Config("catalog endpoint is empty".into()));
        }
        if self.max_chunk_size == 0 {
            return Err(SyncError::Config("max chunk size must be positive".into()));
        }
        if self.max_chunk_size > MAX_CHUNK_SIZE_LIMIT {
            return Err(SyncError::Config(format!(
                "max chunk size {} exceeds limit of {} bytes",
                self.max_chunk_size, MAX_CHUNK_SIZE_LIMIT
            )));
        }
        if self.workers == 0 {
            return Err(SyncError::Config("worker count must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request timeout must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
