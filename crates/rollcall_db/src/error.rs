//! Error types for the SQLite stores.

use rollcall_protocol::ScanKey;
use rollcall_station::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// A stored row does not decode into a domain value.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlx(e) => classify(e),
            DbError::Io(e) => StoreError::transport(e.to_string()),
            other => StoreError::other(other.to_string()),
        }
    }
}

/// Map a driver error onto the station's store error taxonomy.
///
/// Connection-level failures are transport errors so the station queues the
/// scan instead of dropping it.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::transport(err.to_string()),
        sqlx::Error::Database(ref db) if is_busy(db.code().as_deref()) => {
            StoreError::transport(err.to_string())
        }
        other => StoreError::other(other.to_string()),
    }
}

/// Like [`classify`], but a uniqueness violation becomes a conflict on `key`.
pub(crate) fn classify_insert(err: sqlx::Error, key: &ScanKey) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            key: key.clone(),
        },
        _ => classify(err),
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6): another writer holds the file.
///
/// The driver reports extended result codes, so the primary code is the low
/// byte (`SQLITE_BUSY_SNAPSHOT` is 517, `SQLITE_LOCKED_SHAREDCACHE` is 262).
fn is_busy(code: Option<&str>) -> bool {
    match code.and_then(|c| c.trim().parse::<i32>().ok()) {
        Some(code) => matches!(code & 0xff, 5 | 6),
        None => false,
    }
}
