//! Remote catalog retrieval.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use refsync_store::DatabaseName;
use serde::Deserialize;
use tracing::debug;

/// A database advertised by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    /// Database name, with any `.gz` suffix removed.
    pub name: DatabaseName,
    /// Where the content is downloaded from.
    pub content_url: String,
    /// MD5 of the content, lowercase hex.
    pub expected_checksum: String,
}

impl RemoteDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<DatabaseName>,
        content_url: impl Into<String>,
        expected_checksum: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_url: content_url.into(),
            expected_checksum: expected_checksum.into(),
        }
    }
}

/// One entry of the manifest document.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    url: String,
    md5_hash: String,
}

impl TryFrom<ManifestEntry> for RemoteDescriptor {
    type Error = SyncError;

    fn try_from(entry: ManifestEntry) -> SyncResult<Self> {
        let name = entry.name.strip_suffix(".gz").unwrap_or(&entry.name);
        if name.is_empty() {
            return Err(SyncError::Manifest("entry with empty name".into()));
        }
        if entry.url.is_empty() {
            return Err(SyncError::Manifest(format!("entry {} has no url", name)));
        }
        Ok(RemoteDescriptor::new(name, entry.url.as_str(), entry.md5_hash.as_str()))
    }
}

/// Parses a manifest: a JSON array of `{name, url, md5_hash}` objects.
///
/// Order is preserved; unknown fields are ignored.
///
/// # Errors
///
/// Returns [`SyncError::Manifest`] if the document is malformed.
pub fn parse_manifest(body: &[u8]) -> SyncResult<Vec<RemoteDescriptor>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_slice(body).map_err(|e| SyncError::Manifest(e.to_string()))?;
    entries.into_iter().map(RemoteDescriptor::try_from).collect()
}

/// Fetches the list of remote databases.
pub struct CatalogFetcher<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    config: &'a SyncConfig,
}

impl<'a, C: HttpClient + ?Sized> CatalogFetcher<'a, C> {
    /// Creates a fetcher for the configured endpoint.
    pub fn new(client: &'a C, config: &'a SyncConfig) -> Self {
        Self { client, config }
    }

    /// Issues one request to the catalog endpoint and parses the manifest.
    ///
    /// # Errors
    ///
    /// Returns the transport error or [`SyncError::Manifest`]; either aborts
    /// the current cycle.
    pub fn fetch_catalog(&self) -> SyncResult<Vec<RemoteDescriptor>> {
        let url = self.config.catalog_url();
        let body = self.client.get_bytes(&url, self.config.request_timeout)?;
        let descriptors = parse_manifest(&body)?;
        debug!(url = %url, databases = descriptors.len(), "fetched catalog");
        Ok(descriptors)
    }
}
