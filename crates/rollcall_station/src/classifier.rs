//! Scan classifier.
//!
//! Turns one decoded identifier into an outcome under the active
//! (day, purpose): normalize, reject unknown ids, answer duplicates from the
//! local cache, then commit to the record store or fall back to the offline
//! queue.
//!
//! At most one classification runs at a time per station. Decoders deliver
//! the same code many times while a badge stays in frame; inputs arriving
//! while a classification is in flight are dropped without side effects.

use chrono::{DateTime, Local, Utc};
use rollcall_protocol::{Delegate, DelegateId, ScanEvent, ScanKey};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::ScanCache;
use crate::connectivity::Connectivity;
use crate::error::StoreError;
use crate::feedback::{Feedback, FeedbackBoard, Tone};
use crate::metrics::{StationMetrics, STATION_METRICS};
use crate::queue::OfflineQueue;
use crate::roster::Roster;
use crate::session::ScanContext;
use crate::store::ScanStore;
use crate::sync::SyncTrigger;

/// Why a scan went to the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueReason {
    /// Connectivity signal said offline; no insert was attempted.
    Offline,
    /// The insert failed in transit.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Accepted {
        delegate: Delegate,
        event: ScanEvent,
    },
    /// Already recorded according to this station's cache or offline queue.
    DuplicateLocal {
        delegate: Delegate,
        recorded_at: DateTime<Utc>,
        /// The earlier scan is still waiting in the offline queue.
        pending: bool,
    },
    /// The store's uniqueness constraint rejected the insert: another
    /// station recorded this key first.
    DuplicateRemote {
        delegate: Delegate,
    },
    Invalid {
        id: DelegateId,
    },
    Queued {
        delegate: Delegate,
        event: ScanEvent,
        reason: QueueReason,
        queue_length: usize,
    },
    /// Store or queue failure that is neither a conflict nor a transport
    /// error. Nothing was queued.
    SystemError {
        delegate: Delegate,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Accepted,
    DuplicateLocal,
    DuplicateRemote,
    Invalid,
    Queued,
    SystemError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Accepted => "accepted",
            OutcomeKind::DuplicateLocal => "duplicate-local",
            OutcomeKind::DuplicateRemote => "duplicate-remote",
            OutcomeKind::Invalid => "invalid",
            OutcomeKind::Queued => "queued",
            OutcomeKind::SystemError => "system-error",
        }
    }
}

impl ScanOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ScanOutcome::Accepted { .. } => OutcomeKind::Accepted,
            ScanOutcome::DuplicateLocal { .. } => OutcomeKind::DuplicateLocal,
            ScanOutcome::DuplicateRemote { .. } => OutcomeKind::DuplicateRemote,
            ScanOutcome::Invalid { .. } => OutcomeKind::Invalid,
            ScanOutcome::Queued { .. } => OutcomeKind::Queued,
            ScanOutcome::SystemError { .. } => OutcomeKind::SystemError,
        }
    }

    pub fn delegate(&self) -> Option<&Delegate> {
        match self {
            ScanOutcome::Accepted { delegate, .. }
            | ScanOutcome::DuplicateLocal { delegate, .. }
            | ScanOutcome::DuplicateRemote { delegate }
            | ScanOutcome::Queued { delegate, .. }
            | ScanOutcome::SystemError { delegate, .. } => Some(delegate),
            ScanOutcome::Invalid { .. } => None,
        }
    }

    /// Operator-facing message for this outcome.
    pub fn feedback(&self) -> Feedback {
        match self {
            ScanOutcome::Accepted { delegate, .. } => {
                Feedback::new(Tone::Success, delegate.name.clone()).with_detail("Recorded successfully")
            }
            ScanOutcome::DuplicateLocal {
                recorded_at,
                pending,
                ..
            } => {
                let at = recorded_at.with_timezone(&Local).format("%H:%M:%S");
                let detail = if *pending {
                    format!("Already saved offline at {}", at)
                } else {
                    format!("Already recorded at {}", at)
                };
                Feedback::new(Tone::Warning, "Duplicate Entry!").with_detail(detail)
            }
            ScanOutcome::DuplicateRemote { .. } => Feedback::new(Tone::Warning, "Duplicate Entry!")
                .with_detail("Recorded by another device."),
            ScanOutcome::Invalid { id } => {
                Feedback::new(Tone::Error, "Invalid ID").with_detail(format!("{} not found", id))
            }
            ScanOutcome::Queued { reason, .. } => {
                let detail = match reason {
                    QueueReason::Offline => "Will sync when online",
                    QueueReason::Transport => "Network error, queued.",
                };
                Feedback::new(Tone::Warning, "Saved Offline").with_detail(detail)
            }
            ScanOutcome::SystemError { .. } => {
                Feedback::new(Tone::Error, "System Error").with_detail("Could not save scan.")
            }
        }
    }
}

/// Releases the in-flight flag when classification ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScanClassifier {
    roster: Arc<Roster>,
    cache: ScanCache,
    store: Arc<dyn ScanStore>,
    queue: Arc<OfflineQueue>,
    connectivity: Connectivity,
    sync_trigger: Option<SyncTrigger>,
    feedback: Option<FeedbackBoard>,
    in_flight: AtomicBool,
}

impl ScanClassifier {
    pub fn new(
        roster: Arc<Roster>,
        cache: ScanCache,
        store: Arc<dyn ScanStore>,
        queue: Arc<OfflineQueue>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            roster,
            cache,
            store,
            queue,
            connectivity,
            sync_trigger: None,
            feedback: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Fire `trigger` after every enqueue so the sync engine tries right away.
    pub fn with_sync_trigger(mut self, trigger: SyncTrigger) -> Self {
        self.sync_trigger = Some(trigger);
        self
    }

    pub fn with_feedback(mut self, board: FeedbackBoard) -> Self {
        self.feedback = Some(board);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Classify one decoded or typed identifier.
    ///
    /// Returns `None` when another classification is in flight; the input
    /// is dropped without touching the store or the queue.
    pub async fn classify(&self, raw_id: &str, ctx: &ScanContext) -> Option<ScanOutcome> {
        let id = DelegateId::normalize(raw_id);

        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            StationMetrics::inc(&STATION_METRICS.scans_ignored);
            debug!(id = %id, "Classification in flight, input ignored");
            return None;
        };

        let outcome = self.decide(id, ctx).await;
        self.report(&outcome, ctx);
        if let Some(board) = &self.feedback {
            board.show(outcome.feedback());
        }
        Some(outcome)
    }

    async fn decide(&self, id: DelegateId, ctx: &ScanContext) -> ScanOutcome {
        let Some(delegate) = self.roster.lookup(&id).cloned() else {
            return ScanOutcome::Invalid { id };
        };

        let key = ScanKey::new(id, ctx.day(), ctx.purpose());
        if let Some(existing) = self.cache.lookup(&key) {
            return ScanOutcome::DuplicateLocal {
                delegate,
                recorded_at: existing.timestamp,
                pending: false,
            };
        }
        match self.queue.find_held(&key) {
            Ok(Some(queued)) => {
                return ScanOutcome::DuplicateLocal {
                    delegate,
                    recorded_at: queued.timestamp,
                    pending: true,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, "Could not check offline queue for duplicates: {}", e),
        }

        let event = ScanEvent::new(key.delegate_id, key.day, key.purpose, Utc::now());

        if !self.connectivity.is_online() {
            return self.enqueue(delegate, event, QueueReason::Offline);
        }

        match self.store.insert_one(&event).await {
            Ok(committed) => {
                self.cache.record(committed.clone());
                ScanOutcome::Accepted {
                    delegate,
                    event: committed,
                }
            }
            Err(StoreError::Conflict { .. }) => ScanOutcome::DuplicateRemote { delegate },
            Err(StoreError::Transport(msg)) => {
                warn!(delegate = %delegate.id, "Insert failed in transit, queueing: {}", msg);
                self.enqueue(delegate, event, QueueReason::Transport)
            }
            Err(StoreError::Other(msg)) => {
                error!(delegate = %delegate.id, "Insert rejected by store: {}", msg);
                ScanOutcome::SystemError {
                    delegate,
                    message: msg,
                }
            }
        }
    }

    fn enqueue(&self, delegate: Delegate, event: ScanEvent, reason: QueueReason) -> ScanOutcome {
        match self.queue.enqueue(event.clone()) {
            Ok(queue_length) => {
                if let Some(trigger) = &self.sync_trigger {
                    trigger.fire();
                }
                ScanOutcome::Queued {
                    delegate,
                    event,
                    reason,
                    queue_length,
                }
            }
            Err(e) => {
                error!(delegate = %delegate.id, "Could not queue scan offline: {}", e);
                ScanOutcome::SystemError {
                    delegate,
                    message: format!("Could not queue scan offline: {}", e),
                }
            }
        }
    }

    fn report(&self, outcome: &ScanOutcome, ctx: &ScanContext) {
        let day = ctx.day();
        let purpose = ctx.purpose();
        match outcome {
            ScanOutcome::Accepted { delegate, .. } => {
                StationMetrics::inc(&STATION_METRICS.scans_accepted);
                info!(delegate = %delegate.id, %day, purpose, "Scan accepted");
            }
            ScanOutcome::DuplicateLocal {
                delegate, pending, ..
            } => {
                StationMetrics::inc(&STATION_METRICS.scans_duplicate_local);
                info!(delegate = %delegate.id, %day, purpose, pending, "Duplicate scan (local)");
            }
            ScanOutcome::DuplicateRemote { delegate } => {
                StationMetrics::inc(&STATION_METRICS.scans_duplicate_remote);
                info!(delegate = %delegate.id, %day, purpose, "Duplicate scan (another station won)");
            }
            ScanOutcome::Invalid { id } => {
                StationMetrics::inc(&STATION_METRICS.scans_invalid);
                info!(id = %id, "Identifier not on roster");
            }
            ScanOutcome::Queued {
                delegate,
                reason,
                queue_length,
                ..
            } => {
                StationMetrics::inc(&STATION_METRICS.scans_queued);
                info!(delegate = %delegate.id, %day, purpose, ?reason, queue_length, "Scan saved offline");
            }
            ScanOutcome::SystemError { .. } => {
                StationMetrics::inc(&STATION_METRICS.scans_failed);
            }
        }
    }
}
