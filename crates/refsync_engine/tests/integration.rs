//! Integration tests for the sync engine against real stores.

use refsync_engine::{
    md5_hex, retrieve_database, HttpClient, LocalLease, MockHttpClient, OwnershipLease,
    SyncConfig, SyncError, SyncOutcome, SyncScheduler, SyncState,
};
use refsync_store::{
    ChunkStore, DatabaseName, DirStore, MemoryChunkStore, MemoryStateStore, StateStore,
    StoreResult, SyncMetadata, VersionedCatalog,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CHUNK: usize = 16;

fn manifest(entries: &[(&str, &str, &[u8])]) -> String {
    let entries: Vec<String> = entries
        .iter()
        .map(|(name, url, body)| {
            format!(
                r#"{{"name": "{}", "url": "{}", "md5_hash": "{}"}}"#,
                name,
                url,
                md5_hex(body)
            )
        })
        .collect();
    format!("[{}]", entries.join(","))
}

fn chunk_files(dir: &Path) -> usize {
    fs::read_dir(dir.join("chunks")).unwrap().count()
}

fn config() -> SyncConfig {
    SyncConfig::new("https://catalog.example.com/db")
        .with_catalog_query("tos", "agree")
        .with_max_chunk_size(CHUNK)
}

const CATALOG_URL: &str = "https://catalog.example.com/db?tos=agree";

type DynScheduler =
    SyncScheduler<dyn HttpClient, dyn StateStore, dyn ChunkStore, dyn OwnershipLease>;

fn dir_scheduler(client: Arc<MockHttpClient>, store: Arc<DirStore>, config: SyncConfig) -> DynScheduler {
    let client: Arc<dyn HttpClient> = client;
    let state: Arc<dyn StateStore> = store.clone();
    let chunks: Arc<dyn ChunkStore> = store;
    let lease: Arc<dyn OwnershipLease> = Arc::new(LocalLease::default());
    SyncScheduler::new(config, client, state, chunks, lease).unwrap()
}

#[test]
fn generations_replace_each_other_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirStore::open(dir.path(), true).unwrap());
    let client = Arc::new(MockHttpClient::new());
    let v1 = vec![1u8; CHUNK * 3];
    let v2 = vec![2u8; CHUNK * 2 + 5];

    client.set_response(CATALOG_URL, manifest(&[("city.gz", "https://dl/city", v1.as_slice())]));
    client.set_response("https://dl/city", v1.clone());
    let scheduler = dir_scheduler(Arc::clone(&client), Arc::clone(&store), config());

    // First cycle creates chunks 0..=2
    let result = scheduler.run_cycle().unwrap().unwrap();
    assert!(matches!(result.reports[0].result, Ok(SyncOutcome::Created { .. })));
    let name = DatabaseName::new("city");
    assert_eq!(retrieve_database(&*store, &*store, &name).unwrap().unwrap(), v1);
    assert_eq!(chunk_files(dir.path()), 3);

    // Unchanged catalog touches without downloading
    let result = scheduler.run_cycle().unwrap().unwrap();
    assert!(matches!(result.reports[0].result, Ok(SyncOutcome::Touched(_))));
    assert_eq!(client.requests_for("https://dl/city"), 1);

    // New content lands at 3..=5 and the old generation is removed
    client.set_response(CATALOG_URL, manifest(&[("city.gz", "https://dl/city", v2.as_slice())]));
    client.set_response("https://dl/city", v2.clone());
    let result = scheduler.run_cycle().unwrap().unwrap();
    match &result.reports[0].result {
        Ok(SyncOutcome::Updated {
            metadata,
            deleted_chunks,
        }) => {
            assert_eq!(metadata.first_chunk_index, 3);
            assert_eq!(metadata.last_chunk_index, 5);
            assert_eq!(*deleted_chunks, 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(retrieve_database(&*store, &*store, &name).unwrap().unwrap(), v2);
    assert_eq!(chunk_files(dir.path()), 3);

    let stats = scheduler.stats();
    assert_eq!(stats.databases_created, 1);
    assert_eq!(stats.databases_touched, 1);
    assert_eq!(stats.databases_updated, 1);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let data = b"reference data".to_vec();
    {
        let store = Arc::new(DirStore::open(dir.path(), true).unwrap());
        let client = Arc::new(MockHttpClient::new());
        client.set_response(CATALOG_URL, manifest(&[("asn", "https://dl/asn", data.as_slice())]));
        client.set_response("https://dl/asn", data.clone());
        dir_scheduler(client, store, config()).run_cycle().unwrap();
    }

    let store = DirStore::open(dir.path(), false).unwrap();
    let payload = retrieve_database(&store, &store, &"asn".into()).unwrap();
    assert_eq!(payload, Some(data));
}

#[test]
fn failed_update_keeps_prior_generation_readable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirStore::open(dir.path(), true).unwrap());
    let client = Arc::new(MockHttpClient::new());
    let v1 = vec![7u8; CHUNK + 1];
    let v2 = vec![8u8; CHUNK * 4];

    client.set_response(CATALOG_URL, manifest(&[("city", "https://dl/city", v1.as_slice())]));
    client.set_response("https://dl/city", v1.clone());
    let scheduler = dir_scheduler(Arc::clone(&client), Arc::clone(&store), config());
    scheduler.run_cycle().unwrap();

    // The stream dies after two chunks of the new generation
    client.set_response(CATALOG_URL, manifest(&[("city", "https://dl/city", v2.as_slice())]));
    client.set_broken_stream("https://dl/city", v2[..CHUNK * 2].to_vec());
    let result = scheduler.run_cycle().unwrap().unwrap();
    assert!(matches!(result.reports[0].result, Err(SyncError::Io(_))));

    let name = DatabaseName::new("city");
    assert_eq!(retrieve_database(&*store, &*store, &name).unwrap().unwrap(), v1);
    assert_eq!(store.read().unwrap().catalog.get("city").unwrap().first_chunk_index, 0);

    // The retry overwrites the orphans at the same indices
    client.set_response("https://dl/city", v2.clone());
    let result = scheduler.run_cycle().unwrap().unwrap();
    let metadata = result.reports[0].result.as_ref().unwrap().metadata().clone();
    assert_eq!(metadata.first_chunk_index, 2);
    assert_eq!(metadata.last_chunk_index, 5);
    assert_eq!(retrieve_database(&*store, &*store, &name).unwrap().unwrap(), v2);
    assert_eq!(chunk_files(dir.path()), 4);
}

#[test]
fn checksum_mismatch_publishes_nothing() {
    let client = Arc::new(MockHttpClient::new());
    client.set_response(
        CATALOG_URL,
        r#"[{"name": "city", "url": "https://dl/city", "md5_hash": "00000000000000000000000000000000"}]"#,
    );
    client.set_response("https://dl/city", vec![3u8; 40]);
    let state = Arc::new(MemoryStateStore::new());
    let scheduler = SyncScheduler::new(
        config(),
        client,
        Arc::clone(&state),
        Arc::new(MemoryChunkStore::new()),
        Arc::new(LocalLease::default()),
    )
    .unwrap();

    let result = scheduler.run_cycle().unwrap().unwrap();
    let err = result.reports[0].result.as_ref().unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "md5 checksum mismatch, expected [00000000000000000000000000000000], actual [{}]",
            md5_hex(&[3u8; 40])
        )
    );
    assert_eq!(state.publish_count(), 0);
}

/// A state store where another node publishes right before our first
/// publish.
struct RacingStateStore {
    inner: MemoryStateStore,
    raced: AtomicBool,
}

impl StateStore for RacingStateStore {
    fn read(&self) -> StoreResult<VersionedCatalog> {
        self.inner.read()
    }

    fn publish(&self, name: &DatabaseName, metadata: SyncMetadata, expected_version: u64) -> StoreResult<u64> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = self.inner.read()?.version;
            self.inner
                .publish(name, SyncMetadata::new(0, 0, "other-node", 1), current)?;
        }
        self.inner.publish(name, metadata, expected_version)
    }
}

#[test]
fn publish_conflict_abandons_database_for_the_cycle() {
    let data = b"content".to_vec();
    let client = Arc::new(MockHttpClient::new());
    client.set_response(CATALOG_URL, manifest(&[("city", "https://dl/city", data.as_slice())]));
    client.set_response("https://dl/city", data.clone());
    let state = Arc::new(RacingStateStore {
        inner: MemoryStateStore::new(),
        raced: AtomicBool::new(false),
    });
    let chunks = Arc::new(MemoryChunkStore::new());
    let scheduler = SyncScheduler::new(
        config(),
        Arc::clone(&client),
        Arc::clone(&state),
        Arc::clone(&chunks),
        Arc::new(LocalLease::default()),
    )
    .unwrap();

    let result = scheduler.run_cycle().unwrap().unwrap();
    assert!(result.reports[0].result.as_ref().unwrap_err().is_conflict());
    assert_eq!(scheduler.stats().conflicts, 1);
    assert_eq!(state.inner.metadata("city").unwrap().checksum, "other-node");
    assert!(chunks.deletions().is_empty());

    // Next cycle sees the other node's metadata and replaces it
    let result = scheduler.run_cycle().unwrap().unwrap();
    let metadata = result.reports[0].result.as_ref().unwrap().metadata().clone();
    assert_eq!(metadata.first_chunk_index, 1);
    assert_eq!(metadata.checksum, md5_hex(&data));
    assert_eq!(client.requests_for("https://dl/city"), 2);
}

/// A lease that is lost after a fixed number of checks.
struct ExpiringLease {
    remaining: AtomicU64,
}

impl OwnershipLease for ExpiringLease {
    fn is_owner(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[test]
fn lost_lease_cancels_remaining_databases() {
    let client = Arc::new(MockHttpClient::new());
    let bodies: [&[u8]; 3] = [b"a", b"b", b"c"];
    client.set_response(
        CATALOG_URL,
        manifest(&[
            ("a", "https://dl/a", bodies[0]),
            ("b", "https://dl/b", bodies[1]),
            ("c", "https://dl/c", bodies[2]),
        ]),
    );
    for (name, body) in ["a", "b", "c"].iter().zip(bodies) {
        client.set_response(format!("https://dl/{}", name), body);
    }
    let state = Arc::new(MemoryStateStore::new());
    // One check for the cycle, one before the first database
    let lease = Arc::new(ExpiringLease {
        remaining: AtomicU64::new(2),
    });
    let scheduler = SyncScheduler::new(
        config(),
        client,
        Arc::clone(&state),
        Arc::new(MemoryChunkStore::new()),
        lease,
    )
    .unwrap();

    let result = scheduler.run_cycle().unwrap().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.succeeded(), 1);
    let skipped: Vec<&str> = result.skipped.iter().map(DatabaseName::as_str).collect();
    assert_eq!(skipped, vec!["b", "c"]);
    assert_eq!(scheduler.state(), SyncState::Idle);
    assert!(state.metadata("a").is_some());
    assert!(state.metadata("b").is_none());

    // Without the lease nothing runs
    assert!(scheduler.run_cycle().unwrap().is_none());
}

#[test]
fn parallel_cycle_isolates_failures() {
    let client = Arc::new(MockHttpClient::new());
    let names: Vec<String> = (0..8).map(|i| format!("db{}", i)).collect();
    let mut entries = Vec::new();
    let bodies: Vec<Vec<u8>> = (0..8).map(|i| vec![i as u8; CHUNK * (i + 1)]).collect();
    for (name, body) in names.iter().zip(&bodies) {
        let url = format!("https://dl/{}", name);
        client.set_response(url.as_str(), body.clone());
        entries.push((name.clone(), url, body.clone()));
    }
    client.set_error("https://dl/db3", "503 service unavailable");
    // Enough latency that all three workers overlap
    for name in &names {
        client.set_latency(format!("https://dl/{}", name), Duration::from_millis(40));
    }
    let refs: Vec<(&str, &str, &[u8])> = entries
        .iter()
        .map(|(n, u, b)| (n.as_str(), u.as_str(), b.as_slice()))
        .collect();
    client.set_response(CATALOG_URL, manifest(&refs));

    let state = Arc::new(MemoryStateStore::new());
    let chunks = Arc::new(MemoryChunkStore::new());
    let scheduler = SyncScheduler::new(
        config().with_workers(3),
        client,
        Arc::clone(&state),
        Arc::clone(&chunks),
        Arc::new(LocalLease::default()),
    )
    .unwrap();

    let result = scheduler.run_cycle().unwrap().unwrap();
    assert_eq!(result.succeeded(), 7);
    assert_eq!(result.failed(), 1);
    assert!(result.reports[3].result.as_ref().unwrap_err().is_retryable());
    assert_eq!(scheduler.stats().conflicts, 0);

    for (i, name) in names.iter().enumerate() {
        let payload = retrieve_database(&*state, &*chunks, &name.as_str().into()).unwrap();
        if i == 3 {
            assert!(payload.is_none());
        } else {
            assert_eq!(payload.unwrap(), bodies[i]);
            assert_eq!(chunks.indices(name).len(), i + 1);
        }
    }
}

#[test]
fn parallel_workers_publish_every_database_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirStore::open(dir.path(), true).unwrap());
    let client = Arc::new(MockHttpClient::new());
    let names = ["asn", "city", "country", "isp"];

    let publish_catalog = |generation: u8| {
        let bodies: Vec<(String, Vec<u8>)> = names
            .iter()
            .map(|name| (format!("https://dl/{}", name), vec![generation; CHUNK * 2 + 3]))
            .collect();
        for (url, body) in &bodies {
            client.set_response(url.as_str(), body.clone());
            client.set_latency(url.as_str(), Duration::from_millis(50));
        }
        let refs: Vec<(&str, &str, &[u8])> = names
            .iter()
            .zip(&bodies)
            .map(|(name, (url, body))| (*name, url.as_str(), body.as_slice()))
            .collect();
        client.set_response(CATALOG_URL, manifest(&refs));
    };

    publish_catalog(1);
    let scheduler = dir_scheduler(Arc::clone(&client), Arc::clone(&store), config().with_workers(4));

    let result = scheduler.run_cycle().unwrap().unwrap();
    assert_eq!(result.succeeded(), 4, "{:?}", result.reports);
    assert!(result
        .reports
        .iter()
        .all(|r| matches!(r.result, Ok(SyncOutcome::Created { .. }))));

    // Every database is replaced in parallel again
    publish_catalog(2);
    let result = scheduler.run_cycle().unwrap().unwrap();
    assert_eq!(result.succeeded(), 4, "{:?}", result.reports);
    assert!(result
        .reports
        .iter()
        .all(|r| matches!(r.result, Ok(SyncOutcome::Updated { deleted_chunks: 3, .. }))));
    assert_eq!(scheduler.stats().conflicts, 0);

    drop(scheduler);
    drop(store);
    let store = DirStore::open(dir.path(), false).unwrap();
    let snapshot = store.read().unwrap();
    assert_eq!(snapshot.version, 8);
    for name in names {
        let payload = retrieve_database(&store, &store, &name.into()).unwrap().unwrap();
        assert_eq!(payload, vec![2u8; CHUNK * 2 + 3]);
    }
    assert_eq!(chunk_files(dir.path()), 12);
}

#[test]
fn slow_download_times_out_without_blocking_others() {
    let client = Arc::new(MockHttpClient::new());
    let fast = vec![1u8; CHUNK];
    let slow = vec![2u8; CHUNK];
    client.set_response(
        CATALOG_URL,
        manifest(&[
            ("fast", "https://dl/fast", fast.as_slice()),
            ("slow", "https://dl/slow", slow.as_slice()),
        ]),
    );
    client.set_response("https://dl/fast", fast.clone());
    client.set_response("https://dl/slow", slow);
    client.set_latency("https://dl/slow", Duration::from_secs(60));

    let state = Arc::new(MemoryStateStore::new());
    let chunks = Arc::new(MemoryChunkStore::new());
    let scheduler = SyncScheduler::new(
        config()
            .with_workers(2)
            .with_request_timeout(Duration::from_millis(50)),
        client,
        Arc::clone(&state),
        Arc::clone(&chunks),
        Arc::new(LocalLease::default()),
    )
    .unwrap();

    let result = scheduler.run_cycle().unwrap().unwrap();
    assert_eq!(result.succeeded(), 1);
    let err = result.reports[1].result.as_ref().unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
    assert!(err.is_retryable());
    assert!(state.metadata("slow").is_none());
    assert_eq!(retrieve_database(&*state, &*chunks, &"fast".into()).unwrap().unwrap(), fast);
}
