//! Periodic sync scheduling and task ownership.

use crate::catalog::{CatalogFetcher, RemoteDescriptor};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::synchronizer::{DatabaseSynchronizer, SyncOutcome};
use parking_lot::{Mutex, RwLock};
use refsync_store::{ChunkStore, DatabaseName, StateStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// The current state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// A cycle is synchronizing databases.
    Running,
    /// The running cycle was cancelled; in-flight databases are finishing.
    Cancelled,
}

impl SyncState {
    /// Returns true if a cycle is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Running | SyncState::Cancelled)
    }

    /// Returns true if a new cycle can start.
    pub fn can_start_cycle(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Decides whether this node runs sync cycles.
///
/// Exactly one node of a cluster should hold the lease. The scheduler checks
/// it before each cycle and before each database within a cycle.
pub trait OwnershipLease: Send + Sync {
    /// Returns true if this node currently owns the sync task.
    fn is_owner(&self) -> bool;
}

/// A lease held in a local flag.
///
/// For single-node deployments and tests.
#[derive(Debug)]
pub struct LocalLease {
    owner: AtomicBool,
}

impl LocalLease {
    /// Creates a lease, initially held or not.
    pub fn new(owner: bool) -> Self {
        Self {
            owner: AtomicBool::new(owner),
        }
    }

    /// Acquires the lease.
    pub fn grant(&self) {
        self.owner.store(true, Ordering::SeqCst);
    }

    /// Gives up the lease.
    pub fn revoke(&self) {
        self.owner.store(false, Ordering::SeqCst);
    }
}

impl Default for LocalLease {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OwnershipLease for LocalLease {
    fn is_owner(&self) -> bool {
        self.owner.load(Ordering::SeqCst)
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ran to completion or cancellation.
    pub cycles_completed: u64,
    /// Cycles aborted before any database, e.g. by a catalog failure.
    pub cycles_failed: u64,
    /// Databases synchronized for the first time.
    pub databases_created: u64,
    /// Databases replaced with a new generation.
    pub databases_updated: u64,
    /// Databases found unchanged.
    pub databases_touched: u64,
    /// Database synchronizations that failed.
    pub failed_syncs: u64,
    /// Failures caused by a concurrent metadata publish.
    pub conflicts: u64,
    /// Duration of the last cycle.
    pub last_cycle_duration: Option<Duration>,
    /// Last time a cycle finished.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// The result of synchronizing one database within a cycle.
#[derive(Debug)]
pub struct DatabaseReport {
    /// The database.
    pub name: DatabaseName,
    /// What happened to it.
    pub result: SyncResult<SyncOutcome>,
}

/// Result of a sync cycle.
#[derive(Debug)]
pub struct SyncCycleResult {
    /// One report per database started, in catalog order.
    pub reports: Vec<DatabaseReport>,
    /// Databases never started because the cycle was cancelled.
    pub skipped: Vec<DatabaseName>,
    /// Whether the cycle was cancelled.
    pub cancelled: bool,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns the number of databases synchronized successfully.
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_ok()).count()
    }

    /// Returns the number of databases that failed.
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_err()).count()
    }
}

/// Runs sync cycles on behalf of the lease owner.
///
/// A cycle fetches the catalog once and synchronizes every database in it on
/// up to [`SyncConfig::workers`] threads. One database failing never affects
/// the others. Cycles never overlap.
pub struct SyncScheduler<C: ?Sized, S: ?Sized, K: ?Sized, L: ?Sized> {
    config: SyncConfig,
    client: Arc<C>,
    state_store: Arc<S>,
    chunks: Arc<K>,
    lease: Arc<L>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<C, S, K, L> SyncScheduler<C, S, K, L>
where
    C: HttpClient + ?Sized,
    S: StateStore + ?Sized,
    K: ChunkStore + ?Sized,
    L: OwnershipLease + ?Sized,
{
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the configuration is invalid.
    pub fn new(
        config: SyncConfig,
        client: Arc<C>,
        state_store: Arc<S>,
        chunks: Arc<K>,
        lease: Arc<L>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            state_store,
            chunks,
            lease,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels the running cycle.
    ///
    /// Databases already in progress finish; no new database starts. Does
    /// nothing while no cycle is running.
    pub fn cancel(&self) {
        let mut state = self.state.write();
        if *state == SyncState::Running {
            self.cancelled.store(true, Ordering::SeqCst);
            *state = SyncState::Cancelled;
        }
    }

    /// Runs one sync cycle.
    ///
    /// Returns `Ok(None)` without doing anything if syncing is disabled or
    /// this node does not own the lease.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidStateTransition`] if a cycle is already running
    /// - the catalog fetch error, which aborts the cycle before any database
    pub fn run_cycle(&self) -> SyncResult<Option<SyncCycleResult>> {
        if !self.config.enabled {
            debug!("sync disabled, skipping cycle");
            return Ok(None);
        }
        if !self.lease.is_owner() {
            debug!("not the sync owner, skipping cycle");
            return Ok(None);
        }

        self.begin_cycle()?;
        let start = Instant::now();

        let descriptors = match CatalogFetcher::new(&*self.client, &self.config).fetch_catalog() {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!(error = %e, "failed to fetch catalog");
                self.handle_error(&e);
                return Err(e);
            }
        };

        info!(databases = descriptors.len(), "sync cycle started");
        let (reports, skipped) = self.sync_all(&descriptors);

        let result = SyncCycleResult {
            reports,
            skipped,
            cancelled: self.cancelled.swap(false, Ordering::SeqCst),
            duration: start.elapsed(),
        };
        self.finish_cycle(&result);
        Ok(Some(result))
    }

    /// Runs cycles every [`SyncConfig::poll_interval`] until `shutdown`
    /// turns true or its sender is dropped.
    ///
    /// The first cycle runs immediately. Cycles run on the blocking pool; a
    /// shutdown during a cycle cancels it and waits for in-flight databases.
    /// A cycle that had not yet started when shutdown arrived runs to
    /// completion before the loop exits.
    ///
    /// # Errors
    ///
    /// Returns an error only if a cycle panicked. Failed cycles are logged
    /// and retried at the next tick.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> SyncResult<()>
    where
        C: 'static,
        S: 'static,
        K: 'static,
        L: 'static,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.config.poll_interval, "sync scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }

            let scheduler = Arc::clone(&self);
            let mut cycle = tokio::task::spawn_blocking(move || scheduler.run_cycle());
            let mut stopping = false;

            let joined = tokio::select! {
                joined = &mut cycle => joined,
                _ = shutdown_requested(&mut shutdown) => {
                    stopping = true;
                    self.cancel();
                    cycle.await
                }
            };

            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "sync cycle failed"),
                Err(e) => {
                    error!(error = %e, "sync cycle panicked");
                    return Err(SyncError::TaskFailed(e.to_string()));
                }
            }

            if stopping {
                break;
            }
        }

        info!("sync scheduler stopped");
        Ok(())
    }

    fn begin_cycle(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_cycle() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: "Running".into(),
            });
        }
        self.cancelled.store(false, Ordering::SeqCst);
        *state = SyncState::Running;
        Ok(())
    }

    fn sync_all(&self, descriptors: &[RemoteDescriptor]) -> (Vec<DatabaseReport>, Vec<DatabaseName>) {
        let next = AtomicUsize::new(0);
        let reports = Mutex::new(Vec::with_capacity(descriptors.len()));
        let workers = self.config.workers.min(descriptors.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(descriptors, &next, &reports));
            }
        });

        let mut reports = reports.into_inner();
        reports.sort_by_key(|(index, _)| *index);
        let started = next.load(Ordering::SeqCst).min(descriptors.len());
        let skipped = descriptors[started..]
            .iter()
            .map(|d| d.name.clone())
            .collect();

        (reports.into_iter().map(|(_, report)| report).collect(), skipped)
    }

    fn worker(
        &self,
        descriptors: &[RemoteDescriptor],
        next: &AtomicUsize,
        reports: &Mutex<Vec<(usize, DatabaseReport)>>,
    ) {
        let synchronizer =
            DatabaseSynchronizer::new(&*self.client, &*self.state_store, &*self.chunks, &self.config);

        loop {
            if self.should_stop() {
                break;
            }
            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(descriptor) = descriptors.get(index) else {
                break;
            };

            let result = synchronizer.synchronize(descriptor);
            self.record(&descriptor.name, &result);
            reports.lock().push((
                index,
                DatabaseReport {
                    name: descriptor.name.clone(),
                    result,
                },
            ));
        }
    }

    fn should_stop(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if !self.lease.is_owner() {
            warn!("sync ownership lost, cancelling cycle");
            self.cancel();
            return true;
        }
        false
    }

    fn record(&self, name: &DatabaseName, result: &SyncResult<SyncOutcome>) {
        let mut stats = self.stats.write();
        match result {
            Ok(SyncOutcome::Touched(_)) => stats.databases_touched += 1,
            Ok(SyncOutcome::Created { .. }) => stats.databases_created += 1,
            Ok(SyncOutcome::Updated { .. }) => stats.databases_updated += 1,
            Err(e) => {
                if e.is_conflict() {
                    info!(database = %name, "metadata changed concurrently, retrying next cycle");
                    stats.conflicts += 1;
                } else {
                    warn!(database = %name, error = %e, "database sync failed");
                }
                stats.failed_syncs += 1;
                stats.last_error = Some(format!("{}: {}", name, e));
            }
        }
    }

    fn finish_cycle(&self, result: &SyncCycleResult) {
        *self.state.write() = SyncState::Idle;

        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.last_cycle_duration = Some(result.duration);
        stats.last_sync_time = Some(Instant::now());

        info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            skipped = result.skipped.len(),
            cancelled = result.cancelled,
            duration_ms = result.duration.as_millis() as u64,
            "sync cycle finished"
        );
    }

    fn handle_error(&self, error: &SyncError) {
        *self.state.write() = SyncState::Idle;
        self.cancelled.store(false, Ordering::SeqCst);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
