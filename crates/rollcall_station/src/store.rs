//! Store contracts consumed by the station.
//!
//! The roster and the scan record table live in a hosted database in
//! production. The station only sees these traits, so tests and the
//! multi-station simulations run against [`crate::memory`] fakes.

use async_trait::async_trait;
use rollcall_protocol::{Delegate, ScanEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::StoreError;

/// Read-only source of valid delegates.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// All delegates, ordered by id.
    async fn list_delegates(&self) -> Result<Vec<Delegate>, StoreError>;
}

/// Append-only table of committed scans, unique on (delegate, day, purpose).
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert one event; returns the committed row with its store id.
    async fn insert_one(&self, event: &ScanEvent) -> Result<ScanEvent, StoreError>;

    /// Insert all events atomically: either every row commits or none does.
    async fn insert_batch(&self, events: &[ScanEvent]) -> Result<Vec<ScanEvent>, StoreError>;

    /// Every committed event, used for the initial cache load.
    async fn list_scans(&self) -> Result<Vec<ScanEvent>, StoreError>;

    /// Cheap reachability check for the connectivity probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Push feed of events committed from now on, by any station.
    fn subscribe(&self) -> Subscription;
}

/// Item yielded by a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Inserted(ScanEvent),
    /// The subscriber fell behind and `n` notifications were dropped.
    /// Consumers that mirror the store must reload.
    Lagged(u64),
}

/// Cancellable handle on the push feed.
///
/// `next` yields notifications until the feed closes or the handle is
/// cancelled. Dropping the handle cancels it.
pub struct Subscription {
    rx: Option<broadcast::Receiver<ScanEvent>>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<ScanEvent>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Next notification, or `None` once cancelled or closed.
    pub async fn next(&mut self) -> Option<Notification> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Ok(event) => Some(Notification::Inserted(event)),
            Err(RecvError::Lagged(skipped)) => Some(Notification::Lagged(skipped)),
            Err(RecvError::Closed) => {
                self.rx = None;
                None
            }
        }
    }

    pub fn cancel(&mut self) {
        self.rx = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.is_none()
    }

    /// Fresh handle on the same feed, starting from now.
    ///
    /// Returns a cancelled handle if this one is cancelled or closed.
    pub fn restart(&self) -> Subscription {
        Subscription {
            rx: self.rx.as_ref().map(|rx| rx.resubscribe()),
        }
    }
}
