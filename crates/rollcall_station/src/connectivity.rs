//! Online/offline signal.
//!
//! Browsers hand this to the page; a terminal station has to probe the
//! record store itself. [`ConnectivityProbe`] does that on an interval and
//! feeds [`Connectivity`], whose watch channel gives the sync engine its
//! "became online" edge.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::ScanStore;

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Connectivity restored");
            } else {
                warn!("Connectivity lost");
            }
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Periodically pings the record store and reports the result.
pub struct ConnectivityProbe;

impl ConnectivityProbe {
    pub fn spawn(
        store: Arc<dyn ScanStore>,
        connectivity: Connectivity,
        interval: Duration,
    ) -> ProbeHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let reachable = match store.ping().await {
                            Ok(()) => true,
                            Err(e) => {
                                debug!("Store ping failed: {}", e);
                                false
                            }
                        };
                        connectivity.set_online(reachable);
                    }
                }
            }
        });
        ProbeHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

pub struct ProbeHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
