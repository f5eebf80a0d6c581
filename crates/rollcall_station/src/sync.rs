//! Sync engine.
//!
//! Moves offline-queued scans into the record store. A pass is attempted when
//! connectivity comes back, right after a scan is queued, and on a fixed
//! interval while online. At most one pass runs at a time; overlapping
//! requests are skipped rather than queued up.
//!
//! Each pass first tries the whole queue as one all-or-nothing batch. A
//! transport failure leaves the queue intact for the next pass. Any other
//! batch failure means some entry is poisoned (usually a uniqueness conflict
//! with a scan another station recorded while we were offline), so the pass
//! falls back to inserting entries one at a time: committed and conflicting
//! entries leave the queue, rejected entries are quarantined, and the rest
//! still go through.

use chrono::{DateTime, Utc};
use rollcall_protocol::ScanEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::ScanCache;
use crate::connectivity::Connectivity;
use crate::error::{StoreError, SyncError};
use crate::metrics::{StationMetrics, STATION_METRICS};
use crate::queue::{DrainError, OfflineQueue, QueueCounts, StoreSink};
use crate::store::ScanStore;

/// Wakes the sync engine outside its interval.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger(Arc<Notify>);

impl SyncTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass. Multiple fires before the engine wakes collapse into one.
    pub fn fire(&self) {
        self.0.notify_one();
    }

    pub async fn fired(&self) {
        self.0.notified().await;
    }
}

/// What to do when the all-or-nothing batch is rejected for a reason other
/// than transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Leave the queue untouched and report the failure.
    AllOrNothing,
    /// Retry entry by entry so one poisoned entry cannot stall the rest.
    #[default]
    IsolateFailures,
}

/// Observable sync status, for UI backpressure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub queue_length: usize,
    pub quarantined: usize,
    pub is_syncing: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Another pass was already running.
    Busy,
    /// Nothing queued.
    Empty,
    /// The whole queue went in as one batch.
    Synced { committed: usize, remaining: usize },
    /// The batch was rejected and entries were settled one at a time.
    Isolated {
        committed: usize,
        superseded: usize,
        quarantined: usize,
        remaining: usize,
    },
    Failed { error: SyncError, remaining: usize },
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Busy => "busy",
            SyncOutcome::Empty => "empty",
            SyncOutcome::Synced { .. } => "synced",
            SyncOutcome::Isolated { .. } => "isolated",
            SyncOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    /// Entries still pending after the pass, where known.
    pub fn remaining(&self) -> Option<usize> {
        match self {
            SyncOutcome::Synced { remaining, .. }
            | SyncOutcome::Isolated { remaining, .. }
            | SyncOutcome::Failed { remaining, .. } => Some(*remaining),
            SyncOutcome::Empty => Some(0),
            SyncOutcome::Busy => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            SyncOutcome::Busy => "sync already in progress".to_string(),
            SyncOutcome::Empty => "nothing to sync".to_string(),
            SyncOutcome::Synced {
                committed,
                remaining,
            } => format!("synced {} scan(s), {} still queued", committed, remaining),
            SyncOutcome::Isolated {
                committed,
                superseded,
                quarantined,
                remaining,
            } => format!(
                "synced {} scan(s) individually, {} already recorded elsewhere, {} quarantined, {} still queued",
                committed, superseded, quarantined, remaining
            ),
            SyncOutcome::Failed { error, remaining } => {
                format!("sync failed ({}), {} still queued", error, remaining)
            }
        }
    }
}

/// Clears the busy flag and the syncing indicator when a pass ends.
struct PassGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a watch::Sender<SyncStatus>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_if_modified(|s| std::mem::replace(&mut s.is_syncing, false));
        self.busy.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    queue: Arc<OfflineQueue>,
    store: Arc<dyn ScanStore>,
    cache: Option<ScanCache>,
    policy: SyncPolicy,
    busy: AtomicBool,
    state: watch::Sender<SyncStatus>,
}

impl SyncEngine {
    pub fn new(queue: Arc<OfflineQueue>, store: Arc<dyn ScanStore>) -> Self {
        let counts = queue.counts();
        let (state, _) = watch::channel(SyncStatus {
            queue_length: counts.pending,
            quarantined: counts.quarantined,
            ..SyncStatus::default()
        });
        Self {
            queue,
            store,
            cache: None,
            policy: SyncPolicy::default(),
            busy: AtomicBool::new(false),
            state,
        }
    }

    /// Record committed rows into `cache` as they land.
    pub fn with_cache(mut self, cache: ScanCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current status with queue counts read fresh from the queue.
    pub fn status(&self) -> SyncStatus {
        self.refresh_counts(self.queue.counts());
        self.state.borrow().clone()
    }

    /// Status updates. Queue counts follow enqueues while the engine task runs.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.state.subscribe()
    }

    fn refresh_counts(&self, counts: QueueCounts) {
        self.state.send_if_modified(|s| {
            let changed = s.queue_length != counts.pending || s.quarantined != counts.quarantined;
            s.queue_length = counts.pending;
            s.quarantined = counts.quarantined;
            changed
        });
    }

    /// Run one pass now, unless one is already running.
    pub async fn sync_now(&self) -> SyncOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, skipping");
            return SyncOutcome::Busy;
        }
        let _pass = PassGuard {
            busy: &self.busy,
            state: &self.state,
        };

        let pending = match self.queue.snapshot() {
            Ok(entries) => entries.len(),
            Err(e) => return self.finish(self.failed(SyncError::Queue(e))),
        };
        if pending == 0 {
            return SyncOutcome::Empty;
        }

        self.state.send_modify(|s| s.is_syncing = true);
        StationMetrics::inc(&STATION_METRICS.sync_attempts);
        info!(pending, "Syncing queued scans");

        let outcome = match self.queue.drain(&StoreSink(self.store.as_ref())).await {
            Ok(report) => {
                let committed = report.committed.len();
                self.remember(report.committed);
                SyncOutcome::Synced {
                    committed,
                    remaining: report.remaining,
                }
            }
            Err(DrainError::Sink(e)) if e.is_transport() => self.failed(SyncError::Store(e)),
            Err(DrainError::Sink(e)) if self.policy == SyncPolicy::AllOrNothing => {
                self.failed(SyncError::Store(e))
            }
            Err(DrainError::Sink(e)) => {
                warn!("Batch rejected ({}), settling entries one at a time", e);
                self.isolate().await
            }
            Err(DrainError::Queue(e)) => self.failed(SyncError::Queue(e)),
        };
        self.finish(outcome)
    }

    async fn isolate(&self) -> SyncOutcome {
        let snapshot = match self.queue.snapshot() {
            Ok(entries) => entries,
            Err(e) => return self.failed(SyncError::Queue(e)),
        };

        let mut settled = Vec::new();
        let mut quarantine = Vec::new();
        let mut rows = Vec::new();
        let mut superseded = 0;
        let mut interrupted: Option<StoreError> = None;

        for entry in snapshot {
            match self.store.insert_one(&entry).await {
                Ok(row) => {
                    rows.push(row);
                    settled.push(entry);
                }
                Err(StoreError::Conflict { key }) => {
                    info!(key = %key, "Queued scan already recorded elsewhere, dropping");
                    superseded += 1;
                    settled.push(entry);
                }
                Err(e @ StoreError::Transport(_)) => {
                    interrupted = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(key = %entry.key(), "Store rejected queued scan, quarantining: {}", e);
                    quarantine.push(entry);
                }
            }
        }

        let remaining = match self.queue.resolve(&settled, &quarantine) {
            Ok(remaining) => remaining,
            Err(e) => return self.failed(SyncError::Queue(e)),
        };

        let committed = rows.len();
        self.remember(rows);
        StationMetrics::add(&STATION_METRICS.entries_superseded, superseded as u64);
        StationMetrics::add(&STATION_METRICS.entries_quarantined, quarantine.len() as u64);

        if let Some(e) = interrupted {
            return SyncOutcome::Failed {
                error: SyncError::Store(e),
                remaining,
            };
        }
        SyncOutcome::Isolated {
            committed,
            superseded,
            quarantined: quarantine.len(),
            remaining,
        }
    }

    fn remember(&self, rows: Vec<ScanEvent>) {
        StationMetrics::add(&STATION_METRICS.entries_synced, rows.len() as u64);
        if let Some(cache) = &self.cache {
            for row in rows {
                cache.record(row);
            }
        }
    }

    fn failed(&self, error: SyncError) -> SyncOutcome {
        SyncOutcome::Failed {
            error,
            remaining: self.queue.len(),
        }
    }

    fn finish(&self, outcome: SyncOutcome) -> SyncOutcome {
        self.refresh_counts(self.queue.counts());
        match &outcome {
            SyncOutcome::Failed { error, remaining } => {
                StationMetrics::inc(&STATION_METRICS.sync_failures);
                error!(remaining, "Sync failed: {}", error);
                let message = error.to_string();
                self.state.send_modify(|s| s.last_error = Some(message));
            }
            SyncOutcome::Synced { .. } | SyncOutcome::Isolated { .. } => {
                StationMetrics::inc(&STATION_METRICS.sync_successes);
                info!("{}", outcome.summary());
                self.state.send_modify(|s| {
                    s.last_error = None;
                    s.last_synced_at = Some(Utc::now());
                });
            }
            SyncOutcome::Busy | SyncOutcome::Empty => {}
        }
        outcome
    }

    /// Run the engine in the background until the handle is shut down.
    pub fn spawn(
        self: &Arc<Self>,
        connectivity: Connectivity,
        trigger: SyncTrigger,
        interval: Duration,
    ) -> SyncEngineHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_loop(
            Arc::clone(self),
            connectivity,
            trigger,
            interval,
            shutdown_rx,
        ));
        SyncEngineHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    connectivity: Connectivity,
    trigger: SyncTrigger,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut online_rx = connectivity.subscribe();
    let mut was_online = *online_rx.borrow_and_update();
    let mut counts_rx = engine.queue.watch();

    // Entries left over from a previous session
    if was_online {
        engine.sync_now().await;
    }

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("Sync engine stopping");
                break;
            }

            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    engine.sync_now().await;
                }
                was_online = online;
            }

            changed = counts_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let counts = *counts_rx.borrow_and_update();
                engine.refresh_counts(counts);
            }

            _ = trigger.fired() => {
                if connectivity.is_online() {
                    engine.sync_now().await;
                }
            }

            _ = ticker.tick() => {
                if connectivity.is_online() {
                    engine.sync_now().await;
                }
            }
        }
    }
}

/// Owner of the engine task. Dropping the handle stops the loop.
pub struct SyncEngineHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncEngineHandle {
    /// Stop the loop and wait for an in-progress pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncEngineHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
