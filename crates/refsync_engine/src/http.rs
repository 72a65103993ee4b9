//! HTTP client abstraction.
//!
//! The engine never speaks HTTP itself. Embedders implement [`HttpClient`]
//! over their HTTP library of choice (reqwest, hyper, ureq, ...) and the
//! engine only sees byte streams.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// A readable response body.
pub type ContentStream = Box<dyn Read + Send>;

/// HTTP client abstraction.
///
/// Implementations must bound every request by `timeout`; a request that
/// exceeds it fails with [`SyncError::Timeout`] instead of blocking. The
/// engine passes [`crate::SyncConfig::request_timeout`] and never enforces
/// deadlines itself, so network clients are the ones producing `Timeout`.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body as a stream.
    fn get(&self, url: &str, timeout: Duration) -> SyncResult<ContentStream>;

    /// Sends a GET request and returns the whole response body.
    fn get_bytes(&self, url: &str, timeout: Duration) -> SyncResult<Vec<u8>> {
        let mut body = Vec::new();
        self.get(url, timeout)?.read_to_end(&mut body)?;
        Ok(body)
    }
}

/// A client serving `file://` URLs and plain paths from the local disk.
///
/// Used by the CLI to sync from a mirrored directory. Relative paths are
/// resolved against the client's base directory. Local reads are not
/// subject to the request timeout.
#[derive(Debug, Clone)]
pub struct FileClient {
    base_dir: PathBuf,
}

impl FileClient {
    /// Creates a client resolving relative paths against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, url: &str) -> SyncResult<PathBuf> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        // Query strings are meaningless for files
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        if path.contains("://") {
            return Err(SyncError::transport_fatal(format!("unsupported url scheme: {}", url)));
        }

        let path = Path::new(path);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

impl HttpClient for FileClient {
    fn get(&self, url: &str, _timeout: Duration) -> SyncResult<ContentStream> {
        let path = self.resolve(url)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                SyncError::transport_fatal(format!("not found: {}", path.display()))
            }
            _ => SyncError::transport_retryable(format!("{}: {}", path.display(), e)),
        })?;
        Ok(Box::new(file))
    }
}

/// Canned response for [`MockHttpClient`].
#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    /// Body that yields `prefix` and then fails.
    Broken(Vec<u8>),
    Error(String),
}

/// An in-memory HTTP client for testing.
///
/// Serves canned bodies per URL and counts requests. An optional latency
/// delays every response; latency beyond the request timeout fails the
/// request with [`SyncError::Timeout`] once the timeout has elapsed.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: RwLock<HashMap<String, MockResponse>>,
    requests: RwLock<Vec<String>>,
    request_count: AtomicU64,
    latency: RwLock<HashMap<String, Duration>>,
}

impl MockHttpClient {
    /// Creates a client with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`.
    pub fn set_response(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses
            .write()
            .insert(url.into(), MockResponse::Body(body.into()));
    }

    /// Fails requests for `url` with a retryable transport error.
    pub fn set_error(&self, url: impl Into<String>, message: impl Into<String>) {
        self.responses
            .write()
            .insert(url.into(), MockResponse::Error(message.into()));
    }

    /// Serves `prefix` for `url`, then fails the stream with an I/O error.
    pub fn set_broken_stream(&self, url: impl Into<String>, prefix: impl Into<Vec<u8>>) {
        self.responses
            .write()
            .insert(url.into(), MockResponse::Broken(prefix.into()));
    }

    /// Delays every response for `url` by `latency`.
    pub fn set_latency(&self, url: impl Into<String>, latency: Duration) {
        self.latency.write().insert(url.into(), latency);
    }

    /// Returns the number of requests served.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Returns how many times `url` was requested.
    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.read().iter().filter(|u| *u == url).count()
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str, timeout: Duration) -> SyncResult<ContentStream> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().push(url.to_string());

        let latency = self.latency.read().get(url).copied();
        if let Some(latency) = latency {
            if latency > timeout {
                thread::sleep(timeout);
                return Err(SyncError::Timeout);
            }
            thread::sleep(latency);
        }

        match self.responses.read().get(url).cloned() {
            Some(MockResponse::Body(body)) => Ok(Box::new(Cursor::new(body))),
            Some(MockResponse::Broken(prefix)) => Ok(Box::new(Cursor::new(prefix).chain(BrokenReader))),
            Some(MockResponse::Error(message)) => Err(SyncError::transport_retryable(message)),
            None => Err(SyncError::transport_fatal(format!("no mock response for {}", url))),
        }
    }
}

struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"))
    }
}
