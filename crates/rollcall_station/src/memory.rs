//! In-memory roster and scan record stores.
//!
//! Used by tests and by the multi-station simulations. The scan store
//! enforces the same uniqueness rule as the hosted table and can be told to
//! misbehave: go unreachable, reject specific delegates, or add latency.

use async_trait::async_trait;
use rollcall_protocol::defaults::PUSH_CHANNEL_CAPACITY;
use rollcall_protocol::{Delegate, DelegateId, ScanEvent, ScanKey};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{RosterStore, ScanStore, Subscription};

/// Fixed roster.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoster {
    delegates: Vec<Delegate>,
}

impl MemoryRoster {
    pub fn new(mut delegates: Vec<Delegate>) -> Self {
        delegates.sort_by(|a, b| a.id.cmp(&b.id));
        Self { delegates }
    }
}

#[async_trait]
impl RosterStore for MemoryRoster {
    async fn list_delegates(&self) -> Result<Vec<Delegate>, StoreError> {
        Ok(self.delegates.clone())
    }
}

#[derive(Default)]
struct Table {
    rows: Vec<ScanEvent>,
    keys: HashSet<ScanKey>,
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    rejected: HashSet<DelegateId>,
    latency: Option<Duration>,
}

/// Shared scan record table.
pub struct MemoryScanStore {
    table: Mutex<Table>,
    faults: Mutex<Faults>,
    push: broadcast::Sender<ScanEvent>,
    insert_calls: AtomicUsize,
}

impl Default for MemoryScanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScanStore {
    pub fn new() -> Self {
        let (push, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            table: Mutex::new(Table::default()),
            faults: Mutex::new(Faults::default()),
            push,
            insert_calls: AtomicUsize::new(0),
        }
    }

    /// Every operation fails with a transport error while unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.faults).unreachable = !reachable;
    }

    /// Inserts touching `id` fail with a non-conflict store error.
    pub fn reject_delegate(&self, id: &DelegateId) {
        lock(&self.faults).rejected.insert(id.clone());
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.faults).latency = latency;
    }

    pub fn committed(&self) -> Vec<ScanEvent> {
        lock(&self.table).rows.clone()
    }

    pub fn count_for(&self, key: &ScanKey) -> usize {
        lock(&self.table).rows.iter().filter(|e| e.matches(key)).count()
    }

    /// Number of insert_one/insert_batch calls that reached the store.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let latency = lock(&self.faults).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.faults).unreachable {
            return Err(StoreError::transport("store unreachable"));
        }
        Ok(())
    }

    fn check_rejected(&self, events: &[ScanEvent]) -> Result<(), StoreError> {
        let faults = lock(&self.faults);
        if let Some(event) = events.iter().find(|e| faults.rejected.contains(&e.delegate_id)) {
            return Err(StoreError::other(format!(
                "row rejected for delegate {}",
                event.delegate_id
            )));
        }
        Ok(())
    }

    fn publish(&self, committed: &[ScanEvent]) {
        for event in committed {
            // No subscribers is fine.
            let _ = self.push.send(event.clone());
        }
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn insert_one(&self, event: &ScanEvent) -> Result<ScanEvent, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.check_rejected(std::slice::from_ref(event))?;

        let committed = {
            let mut table = lock(&self.table);
            let key = event.key();
            if table.keys.contains(&key) {
                return Err(StoreError::Conflict { key });
            }
            let committed = event.clone().committed(Uuid::new_v4().to_string());
            table.keys.insert(key);
            table.rows.push(committed.clone());
            committed
        };
        self.publish(std::slice::from_ref(&committed));
        Ok(committed)
    }

    async fn insert_batch(&self, events: &[ScanEvent]) -> Result<Vec<ScanEvent>, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.check_rejected(events)?;

        let committed = {
            let mut table = lock(&self.table);
            let mut batch_keys = HashSet::new();
            for event in events {
                let key = event.key();
                if table.keys.contains(&key) || !batch_keys.insert(key.clone()) {
                    return Err(StoreError::Conflict { key });
                }
            }
            let committed: Vec<ScanEvent> = events
                .iter()
                .map(|e| e.clone().committed(Uuid::new_v4().to_string()))
                .collect();
            table.keys.extend(batch_keys);
            table.rows.extend(committed.iter().cloned());
            committed
        };
        self.publish(&committed);
        Ok(committed)
    }

    async fn list_scans(&self) -> Result<Vec<ScanEvent>, StoreError> {
        self.gate().await?;
        Ok(self.committed())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.gate().await
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.push.subscribe())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
