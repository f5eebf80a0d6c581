//! Local scan cache.
//!
//! Mirror of committed scans keyed by (delegate, day, purpose), filled by a
//! full load at startup and kept current by the store's push feed. The cache
//! can miss a scan committed elsewhere (the push has not arrived yet) but
//! never holds one that was not committed, so a hit is always a real
//! duplicate.

use rollcall_protocol::{ScanEvent, ScanKey};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{Notification, ScanStore, Subscription};

#[derive(Debug, Clone, Default)]
pub struct ScanCache {
    inner: Arc<RwLock<HashMap<ScanKey, ScanEvent>>>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mirror, e.g. after the initial load or a lagged feed.
    pub fn replace_all(&self, events: impl IntoIterator<Item = ScanEvent>) {
        let mut fresh = HashMap::new();
        for event in events {
            fresh.entry(event.key()).or_insert(event);
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Record a committed event. Returns false if the key was already present;
    /// the first recorded event for a key is kept.
    pub fn record(&self, event: ScanEvent) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = event.key();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, event);
        true
    }

    pub fn lookup(&self, key: &ScanKey) -> Option<ScanEvent> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background task applying push notifications to a [`ScanCache`].
pub struct CacheFeed;

impl CacheFeed {
    /// Load every committed scan into `cache`, then follow the push feed.
    ///
    /// The subscription is opened before the full load so commits landing
    /// in between are not missed; replaying them is harmless.
    pub async fn start(
        cache: ScanCache,
        store: Arc<dyn ScanStore>,
    ) -> Result<CacheFeedHandle, StoreError> {
        let subscription = store.subscribe();
        let events = store.list_scans().await?;
        cache.replace_all(events);
        info!(scans = cache.len(), "Scan cache loaded");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(follow(cache, store, subscription, shutdown_rx));
        Ok(CacheFeedHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

async fn follow(
    cache: ScanCache,
    store: Arc<dyn ScanStore>,
    mut subscription: Subscription,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                subscription.cancel();
                debug!("Cache feed cancelled");
                break;
            }

            notification = subscription.next() => match notification {
                Some(Notification::Inserted(event)) => {
                    if cache.record(event) {
                        debug!(scans = cache.len(), "Cache updated from push");
                    }
                }
                Some(Notification::Lagged(skipped)) => {
                    warn!(skipped, "Push feed lagged, reloading scan cache");
                    match store.list_scans().await {
                        Ok(events) => cache.replace_all(events),
                        Err(e) => warn!("Cache reload failed, keeping stale cache: {}", e),
                    }
                }
                None => {
                    info!("Push feed closed");
                    break;
                }
            }
        }
    }
}

/// Owner of the feed task. Dropping the handle cancels the subscription.
pub struct CacheFeedHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CacheFeedHandle {
    /// Cancel the subscription and wait for the task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CacheFeedHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
