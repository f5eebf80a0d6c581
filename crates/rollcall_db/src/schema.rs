//! Table definitions for the roster and the scan record store.

use crate::error::Result;
use crate::SqliteStore;
use tracing::info;

impl SqliteStore {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS delegates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                organization TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // seq orders rows for the change feed; (delegate, day, purpose) is
        // the attendance invariant every station relies on.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scans (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                delegate_id TEXT NOT NULL,
                day INTEGER NOT NULL CHECK (day BETWEEN 1 AND 4),
                purpose TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                UNIQUE(delegate_id, day, purpose)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_day_purpose ON scans(day, purpose)")
            .execute(&self.pool)
            .await?;

        info!("Database schema verified");
        Ok(())
    }
}
