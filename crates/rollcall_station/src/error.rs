//! Error types for the scanning station.

use rollcall_protocol::{Day, ScanKey};
use thiserror::Error;

/// Failure reported by a roster or scan record store.
///
/// The classifier and the sync engine branch on the variant: conflicts are
/// expected races, transport failures are recovered by queueing, anything
/// else is a hard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness constraint on (delegate, day, purpose) rejected the write.
    #[error("Scan already recorded: {key}")]
    Conflict { key: ScanKey },

    /// The store could not be reached or the request was aborted.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other store-side failure.
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

/// Offline queue persistence errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue storage '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue storage unavailable: {0}")]
    Storage(String),

    #[error("Queue lock poisoned")]
    LockPoisoned,
}

/// Why an operator may not scan for a (day, purpose).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("No operator selected for this station")]
    NoOperator,

    #[error("{user} may not scan on day {day}")]
    DayNotAllowed { user: String, day: Day },

    #[error("{user} may not scan '{purpose}' on day {day}")]
    PurposeNotAllowed {
        user: String,
        day: Day,
        purpose: String,
    },
}

/// Error from a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
