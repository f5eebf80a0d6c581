//! SQLite-backed roster and scan record stores.
//!
//! One database file can be shared by several station processes on the same
//! host or network share. The `scans` table carries the uniqueness constraint
//! on (delegate, day, purpose); every station's insert goes through it.

pub mod error;
mod feed;
mod roster;
mod scans;
mod schema;

pub use error::{DbError, Result};
pub use feed::ChangeFeedHandle;

use rollcall_protocol::defaults::PUSH_CHANNEL_CAPACITY;
use rollcall_protocol::ScanEvent;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Roster and scan record store on one SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
    push: broadcast::Sender<ScanEvent>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path.as_ref());
        Self::connect(options).await
    }

    /// Open from a `sqlite:` URL. `sqlite::memory:` gives a private in-memory store.
    pub async fn open_url(url: &str) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::open_memory().await;
        }
        if !url.starts_with("sqlite:") {
            return Err(DbError::InvalidUrl(url.to_string()));
        }
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbError::InvalidUrl(format!("{}: {}", url, e)))?;
        Self::connect(options).await
    }

    /// In-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let parent = options.get_filename().parent().map(Path::to_path_buf);
        if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(&parent)?;
        }
        let filename = options.get_filename().display().to_string();

        let options = options.create_if_missing(true).busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(path = %filename, "Connected to record store");
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let (push, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        let store = Self { pool, push };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn publish(&self, event: &ScanEvent) {
        // No subscribers is fine.
        let _ = self.push.send(event.clone());
    }
}
