//! Rollcall scanning station.
//!
//! Classifies scanned delegate ids, keeps a local mirror of committed scans,
//! queues scans while the record store is unreachable and syncs them back.
//! Stores are reached through the traits in [`store`]; `rollcall_db` provides
//! the SQLite implementation and [`memory`] the in-process one.

pub mod cache;
pub mod classifier;
pub mod connectivity;
pub mod error;
pub mod feedback;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod roster;
pub mod session;
pub mod store;
pub mod sync;

pub use cache::{CacheFeed, CacheFeedHandle, ScanCache};
pub use classifier::{OutcomeKind, QueueReason, ScanClassifier, ScanOutcome};
pub use connectivity::{Connectivity, ConnectivityProbe, ProbeHandle};
pub use error::{PermissionError, QueueError, StoreError, SyncError};
pub use feedback::{Feedback, FeedbackBoard, Tone};
pub use memory::{MemoryRoster, MemoryScanStore};
pub use metrics::{MetricsSnapshot, StationMetrics, STATION_METRICS};
pub use queue::{
    DrainError, DrainReport, FileStorage, MemoryStorage, OfflineQueue, QueueCounts, QueueSink,
    QueueStorage, StoreSink,
};
pub use roster::Roster;
pub use session::{ScanContext, SessionContext};
pub use store::{Notification, RosterStore, ScanStore, Subscription};
pub use sync::{SyncEngine, SyncEngineHandle, SyncOutcome, SyncPolicy, SyncStatus, SyncTrigger};
