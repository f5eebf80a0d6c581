//! Change feed across processes.
//!
//! Inserts made through a [`SqliteStore`] are pushed to its subscribers
//! directly. Stations in other processes write to the same file without
//! telling us, so a poller follows the `seq` column and republishes new rows.
//! Rows this process inserted are published a second time; subscribers
//! deduplicate by scan key.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::SqliteStore;

impl SqliteStore {
    /// Poll for rows committed by other processes every `interval`.
    pub fn watch_changes(self: &Arc<Self>, interval: Duration) -> ChangeFeedHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(poll_loop(Arc::clone(self), interval, shutdown_rx));
        ChangeFeedHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn poll_loop(
    store: Arc<SqliteStore>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut watermark = match store.max_seq().await {
        Ok(seq) => seq,
        Err(e) => {
            warn!("Could not read scan watermark, replaying from start: {}", e);
            0
        }
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                match store.scans_since(watermark).await {
                    Ok(rows) => {
                        for (seq, event) in rows {
                            watermark = seq;
                            store.publish(&event);
                        }
                    }
                    Err(e) => debug!("Change poll failed: {}", e),
                }
            }
        }
    }
}

/// Owner of the poller task. Dropping the handle stops polling.
pub struct ChangeFeedHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeedHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChangeFeedHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
