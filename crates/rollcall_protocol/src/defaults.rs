//! Canonical default values shared by the station and the CLI.

/// Periodic sync tick.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
/// How often the CLI probes the record store to drive the connectivity signal.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
/// How long scan feedback stays on screen before it is cleared.
pub const DEFAULT_FEEDBACK_RESET_MILLIS: u64 = 1500;
/// Storage key of the persisted offline queue.
pub const QUEUE_STORAGE_KEY: &str = "scan_queue";
/// Storage key of entries the sync engine set aside after a store rejection.
pub const QUARANTINE_STORAGE_KEY: &str = "scan_queue_quarantine";
/// Capacity of the in-process push channel for committed scans.
pub const PUSH_CHANNEL_CAPACITY: usize = 1024;
