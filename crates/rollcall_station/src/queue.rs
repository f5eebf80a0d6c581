//! Offline queue.
//!
//! Durable FIFO of scans that could not be committed. The persisted layout is
//! a JSON array of `{delegate_id, day, purpose, timestamp}` records stored
//! under a fixed key, read and written as a whole. Every read-modify-write
//! runs under one lock and never across an await, so concurrent producers
//! cannot lose each other's appends.
//!
//! Draining is snapshot-then-confirm: the snapshot is handed to a sink, and
//! only the entries of that exact snapshot are removed once the sink reports
//! success. Entries appended while the sink was busy stay queued.

use async_trait::async_trait;
use rollcall_protocol::defaults::{QUARANTINE_STORAGE_KEY, QUEUE_STORAGE_KEY};
use rollcall_protocol::{ScanEvent, ScanKey};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{QueueError, StoreError};
use crate::store::ScanStore;

// ============================================================================
// Storage backends
// ============================================================================

/// Whole-value key/value storage, the durable analogue of browser local storage.
pub trait QueueStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, QueueError>;
    fn store(&self, key: &str, value: &str) -> Result<(), QueueError>;
    fn remove(&self, key: &str) -> Result<(), QueueError>;
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temp file that is renamed over the target, so a crash
/// leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, QueueError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl QueueStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, QueueError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), QueueError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile storage for tests; writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }
}

impl QueueStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.raw(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), QueueError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueueError::Storage("storage is read-only".to_string()));
        }
        self.values
            .lock()
            .map_err(|_| QueueError::LockPoisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), QueueError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueueError::Storage("storage is read-only".to_string()));
        }
        self.values
            .lock()
            .map_err(|_| QueueError::LockPoisoned)?
            .remove(key);
        Ok(())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination of a drained batch.
#[async_trait]
pub trait QueueSink: Send + Sync {
    /// Commit the whole batch or fail without committing anything.
    async fn commit(&self, batch: &[ScanEvent]) -> Result<Vec<ScanEvent>, StoreError>;
}

/// Drains into a scan record store with a single batch insert.
pub struct StoreSink<'a>(pub &'a dyn ScanStore);

#[async_trait]
impl QueueSink for StoreSink<'_> {
    async fn commit(&self, batch: &[ScanEvent]) -> Result<Vec<ScanEvent>, StoreError> {
        self.0.insert_batch(batch).await
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Pending and quarantined entry counts, published for UI backpressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub quarantined: usize,
}

/// Result of a successful drain.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Rows as returned by the sink (with store ids when the sink is a store).
    pub committed: Vec<ScanEvent>,
    /// Entries still queued afterwards (appended during the drain).
    pub remaining: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    /// The sink failed; the queue is untouched.
    #[error("Sink rejected batch: {0}")]
    Sink(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct OfflineQueue {
    storage: Box<dyn QueueStorage>,
    lock: Mutex<()>,
    counts: watch::Sender<QueueCounts>,
}

impl OfflineQueue {
    pub fn open(storage: impl QueueStorage + 'static) -> Result<Self, QueueError> {
        let (counts, _) = watch::channel(QueueCounts::default());
        let queue = Self {
            storage: Box::new(storage),
            lock: Mutex::new(()),
            counts,
        };
        let initial = QueueCounts {
            pending: queue.read(QUEUE_STORAGE_KEY)?.len(),
            quarantined: queue.read(QUARANTINE_STORAGE_KEY)?.len(),
        };
        if initial.pending > 0 {
            info!(pending = initial.pending, "Offline queue has entries from a previous session");
        }
        queue.counts.send_replace(initial);
        Ok(queue)
    }

    /// Append one event. Returns the new queue length.
    pub fn enqueue(&self, event: ScanEvent) -> Result<usize, QueueError> {
        let _guard = self.guard()?;
        let mut entries = self.read(QUEUE_STORAGE_KEY)?;
        entries.push(event.pending());
        self.write(QUEUE_STORAGE_KEY, &entries)?;
        let len = entries.len();
        self.counts.send_modify(|c| c.pending = len);
        debug!(pending = len, "Scan queued");
        Ok(len)
    }

    /// Hand the current snapshot to `sink`. On success exactly that snapshot
    /// is removed; on failure the queue is left as it was.
    pub async fn drain(&self, sink: &dyn QueueSink) -> Result<DrainReport, DrainError> {
        let snapshot = self.snapshot()?;
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }

        let committed = sink.commit(&snapshot).await?;
        let remaining = self.resolve(&snapshot, &[])?;
        Ok(DrainReport {
            committed,
            remaining,
        })
    }

    /// Remove `resolved` entries and move `quarantine` entries aside.
    ///
    /// Entries are matched by key and timestamp, first occurrence each.
    /// Returns the pending length afterwards.
    pub fn resolve(
        &self,
        resolved: &[ScanEvent],
        quarantine: &[ScanEvent],
    ) -> Result<usize, QueueError> {
        let _guard = self.guard()?;
        let mut entries = self.read(QUEUE_STORAGE_KEY)?;

        let settled: Vec<&ScanEvent> = resolved.iter().chain(quarantine.iter()).collect();
        let is_prefix = settled.len() <= entries.len()
            && settled.iter().zip(entries.iter()).all(|(s, e)| s.same_scan(e));
        if is_prefix {
            entries.drain(..settled.len());
        } else {
            for done in &settled {
                match entries.iter().position(|e| e.same_scan(done)) {
                    Some(idx) => {
                        entries.remove(idx);
                    }
                    None => warn!(key = %done.key(), "Settled entry no longer queued"),
                }
            }
        }

        // Quarantine is saved before the trimmed queue. A failure in between
        // leaves an entry in both lists, and the retry settles it as a conflict.
        let mut quarantined = self.read(QUARANTINE_STORAGE_KEY)?;
        if !quarantine.is_empty() {
            quarantined.extend(quarantine.iter().cloned().map(ScanEvent::pending));
            self.write(QUARANTINE_STORAGE_KEY, &quarantined)?;
        }
        self.write(QUEUE_STORAGE_KEY, &entries)?;

        let counts = QueueCounts {
            pending: entries.len(),
            quarantined: quarantined.len(),
        };
        self.counts.send_replace(counts);
        Ok(counts.pending)
    }

    /// Move every quarantined entry back to the end of the queue.
    pub fn requeue_quarantined(&self) -> Result<usize, QueueError> {
        let _guard = self.guard()?;
        let quarantined = self.read(QUARANTINE_STORAGE_KEY)?;
        if quarantined.is_empty() {
            return Ok(0);
        }
        let mut entries = self.read(QUEUE_STORAGE_KEY)?;
        let moved = quarantined.len();
        entries.extend(quarantined);
        // Queue first: a failed clear duplicates entries but never drops them.
        self.write(QUEUE_STORAGE_KEY, &entries)?;
        self.write(QUARANTINE_STORAGE_KEY, &[])?;
        self.counts.send_replace(QueueCounts {
            pending: entries.len(),
            quarantined: 0,
        });
        info!(moved, "Quarantined scans re-queued");
        Ok(moved)
    }

    pub fn snapshot(&self) -> Result<Vec<ScanEvent>, QueueError> {
        let _guard = self.guard()?;
        self.read(QUEUE_STORAGE_KEY)
    }

    pub fn quarantined(&self) -> Result<Vec<ScanEvent>, QueueError> {
        let _guard = self.guard()?;
        self.read(QUARANTINE_STORAGE_KEY)
    }

    /// Queued entry for `key`, if one is waiting.
    pub fn find(&self, key: &ScanKey) -> Result<Option<ScanEvent>, QueueError> {
        Ok(self.snapshot()?.into_iter().find(|e| e.matches(key)))
    }

    /// Entry for `key` held locally, pending or quarantined.
    pub fn find_held(&self, key: &ScanKey) -> Result<Option<ScanEvent>, QueueError> {
        let _guard = self.guard()?;
        if let Some(queued) = self.read(QUEUE_STORAGE_KEY)?.into_iter().find(|e| e.matches(key)) {
            return Ok(Some(queued));
        }
        Ok(self
            .read(QUARANTINE_STORAGE_KEY)?
            .into_iter()
            .find(|e| e.matches(key)))
    }

    /// Last observed queue length. Not a correctness mechanism.
    pub fn len(&self) -> usize {
        self.counts.borrow().pending
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> QueueCounts {
        *self.counts.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<QueueCounts> {
        self.counts.subscribe()
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, QueueError> {
        self.lock.lock().map_err(|_| QueueError::LockPoisoned)
    }

    fn read(&self, key: &str) -> Result<Vec<ScanEvent>, QueueError> {
        match self.storage.load(key)? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| QueueError::Corrupt {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, entries: &[ScanEvent]) -> Result<(), QueueError> {
        if entries.is_empty() {
            return self.storage.remove(key);
        }
        let raw = serde_json::to_string(entries)?;
        self.storage.store(key, &raw)
    }
}
