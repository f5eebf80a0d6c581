//! Station counters.
//!
//! Lock-free atomics bumped by the classifier and the sync engine, logged on
//! shutdown. Single writer per counter in practice, many readers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide station counters.
pub static STATION_METRICS: StationMetrics = StationMetrics::new();

pub struct StationMetrics {
    // Classification outcomes
    pub scans_accepted: AtomicU64,
    pub scans_duplicate_local: AtomicU64,
    pub scans_duplicate_remote: AtomicU64,
    pub scans_invalid: AtomicU64,
    pub scans_queued: AtomicU64,
    pub scans_failed: AtomicU64,
    pub scans_ignored: AtomicU64,

    // Sync engine
    pub sync_attempts: AtomicU64,
    pub sync_successes: AtomicU64,
    pub sync_failures: AtomicU64,
    pub entries_synced: AtomicU64,
    pub entries_superseded: AtomicU64,
    pub entries_quarantined: AtomicU64,
}

impl Default for StationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StationMetrics {
    pub const fn new() -> Self {
        Self {
            scans_accepted: AtomicU64::new(0),
            scans_duplicate_local: AtomicU64::new(0),
            scans_duplicate_remote: AtomicU64::new(0),
            scans_invalid: AtomicU64::new(0),
            scans_queued: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            scans_ignored: AtomicU64::new(0),
            sync_attempts: AtomicU64::new(0),
            sync_successes: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
            entries_synced: AtomicU64::new(0),
            entries_superseded: AtomicU64::new(0),
            entries_quarantined: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            scans_accepted: load(&self.scans_accepted),
            scans_duplicate_local: load(&self.scans_duplicate_local),
            scans_duplicate_remote: load(&self.scans_duplicate_remote),
            scans_invalid: load(&self.scans_invalid),
            scans_queued: load(&self.scans_queued),
            scans_failed: load(&self.scans_failed),
            scans_ignored: load(&self.scans_ignored),
            sync_attempts: load(&self.sync_attempts),
            sync_successes: load(&self.sync_successes),
            sync_failures: load(&self.sync_failures),
            entries_synced: load(&self.entries_synced),
            entries_superseded: load(&self.entries_superseded),
            entries_quarantined: load(&self.entries_quarantined),
        }
    }
}

/// Point-in-time copy of [`StationMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub scans_accepted: u64,
    pub scans_duplicate_local: u64,
    pub scans_duplicate_remote: u64,
    pub scans_invalid: u64,
    pub scans_queued: u64,
    pub scans_failed: u64,
    pub scans_ignored: u64,
    pub sync_attempts: u64,
    pub sync_successes: u64,
    pub sync_failures: u64,
    pub entries_synced: u64,
    pub entries_superseded: u64,
    pub entries_quarantined: u64,
}
