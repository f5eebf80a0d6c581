//! Delegate roster on the `delegates` table.

use async_trait::async_trait;
use rollcall_protocol::{Delegate, DelegateId};
use rollcall_station::{RosterStore, StoreError};
use tracing::info;

use crate::error::{classify, Result};
use crate::SqliteStore;

#[derive(Debug, sqlx::FromRow)]
struct DelegateRow {
    id: String,
    name: String,
    organization: Option<String>,
}

impl From<DelegateRow> for Delegate {
    fn from(row: DelegateRow) -> Self {
        Delegate {
            id: DelegateId::from(row.id),
            name: row.name,
            organization: row.organization,
        }
    }
}

impl SqliteStore {
    /// Insert or update delegates by id. Returns the number of rows written.
    pub async fn import_delegates(&self, delegates: &[Delegate]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for delegate in delegates {
            sqlx::query(
                r#"
                INSERT INTO delegates (id, name, organization)
                VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    organization = excluded.organization
                "#,
            )
            .bind(delegate.id.as_str())
            .bind(&delegate.name)
            .bind(delegate.organization.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(delegates = delegates.len(), "Roster imported");
        Ok(delegates.len())
    }

    pub async fn delegate_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delegates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RosterStore for SqliteStore {
    async fn list_delegates(&self) -> std::result::Result<Vec<Delegate>, StoreError> {
        let rows: Vec<DelegateRow> =
            sqlx::query_as("SELECT id, name, organization FROM delegates ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(classify)?;
        Ok(rows.into_iter().map(Delegate::from).collect())
    }
}
