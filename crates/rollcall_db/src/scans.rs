//! Scan record store on the `scans` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_protocol::{Day, DelegateId, ScanEvent};
use rollcall_station::{ScanStore, StoreError, Subscription};
use sqlx::{Executor, Sqlite};
use tracing::debug;
use uuid::Uuid;

use crate::error::{classify, classify_insert, DbError};
use crate::SqliteStore;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ScanRow {
    pub(crate) seq: i64,
    id: String,
    delegate_id: String,
    day: i64,
    purpose: String,
    timestamp: DateTime<Utc>,
}

impl ScanRow {
    pub(crate) fn into_event(self) -> Result<ScanEvent, DbError> {
        let day = u8::try_from(self.day)
            .ok()
            .and_then(Day::from_number)
            .ok_or_else(|| DbError::CorruptRow(format!("scan {} has day {}", self.id, self.day)))?;
        Ok(
            ScanEvent::new(DelegateId::from(self.delegate_id), day, self.purpose, self.timestamp)
                .committed(self.id),
        )
    }
}

pub(crate) const SELECT_SCANS: &str =
    "SELECT seq, id, delegate_id, day, purpose, timestamp FROM scans";

async fn insert_row<'e, E>(executor: E, row: &ScanEvent) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO scans (id, delegate_id, day, purpose, timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.id.clone())
    .bind(row.delegate_id.as_str().to_string())
    .bind(i64::from(row.day.number()))
    .bind(row.purpose.clone())
    .bind(row.timestamp)
    .execute(executor)
    .await?;
    Ok(())
}

impl SqliteStore {
    /// Committed rows with `seq` greater than `after`, oldest first.
    pub(crate) async fn scans_since(&self, after: i64) -> Result<Vec<(i64, ScanEvent)>, DbError> {
        let rows: Vec<ScanRow> = sqlx::query_as(&format!("{} WHERE seq > ? ORDER BY seq", SELECT_SCANS))
            .bind(after)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let seq = row.seq;
                row.into_event().map(|event| (seq, event))
            })
            .collect()
    }

    pub(crate) async fn max_seq(&self) -> Result<i64, DbError> {
        let seq: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM scans")
            .fetch_one(&self.pool)
            .await?;
        Ok(seq.unwrap_or(0))
    }
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn insert_one(&self, event: &ScanEvent) -> Result<ScanEvent, StoreError> {
        let row = event.clone().committed(Uuid::new_v4().to_string());
        insert_row(&self.pool, &row)
            .await
            .map_err(|e| classify_insert(e, &event.key()))?;
        debug!(key = %row.key(), "Scan committed");
        self.publish(&row);
        Ok(row)
    }

    async fn insert_batch(&self, events: &[ScanEvent]) -> Result<Vec<ScanEvent>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            let row = event.clone().committed(Uuid::new_v4().to_string());
            // Dropping the transaction on error rolls back the whole batch.
            insert_row(&mut *tx, &row)
                .await
                .map_err(|e| classify_insert(e, &event.key()))?;
            committed.push(row);
        }
        tx.commit().await.map_err(classify)?;

        debug!(rows = committed.len(), "Scan batch committed");
        for row in &committed {
            self.publish(row);
        }
        Ok(committed)
    }

    async fn list_scans(&self) -> Result<Vec<ScanEvent>, StoreError> {
        let rows: Vec<ScanRow> = sqlx::query_as(&format!("{} ORDER BY seq", SELECT_SCANS))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.into_iter()
            .map(|row| row.into_event().map_err(StoreError::from))
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.push.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_station::Notification;

    fn event(id: &str, day: Day, purpose: &str) -> ScanEvent {
        ScanEvent::new(DelegateId::normalize(id), day, purpose, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_one_and_conflict() {
        let store = SqliteStore::open_memory().await.unwrap();
        let row = store.insert_one(&event("EVT-001", Day::Two, "Breakfast")).await.unwrap();
        assert!(row.is_committed());

        let err = store
            .insert_one(&event("evt-001", Day::Two, "Breakfast"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                key: event("EVT-001", Day::Two, "Breakfast").key()
            }
        );

        let scans = store.list_scans().await.unwrap();
        assert_eq!(scans, vec![row]);
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_conflict() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.insert_one(&event("EVT-003", Day::Three, "Lunch")).await.unwrap();

        let batch = vec![
            event("EVT-001", Day::Three, "Lunch"),
            event("EVT-003", Day::Three, "Lunch"),
            event("EVT-004", Day::Three, "Lunch"),
        ];
        let err = store.insert_batch(&batch).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.list_scans().await.unwrap().len(), 1);

        let rows = store.insert_batch(&[event("EVT-001", Day::Three, "Lunch")]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.list_scans().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timestamps_round_trip() {
        let store = SqliteStore::open_memory().await.unwrap();
        let original = event("EVT-005", Day::Four, "Drop");
        store.insert_one(&original).await.unwrap();
        let stored = store.list_scans().await.unwrap().remove(0);
        assert_eq!(stored.timestamp, original.timestamp);
        assert_eq!(stored.day, Day::Four);
        assert_eq!(stored.purpose, "Drop");
    }

    #[tokio::test]
    async fn test_commits_are_pushed() {
        let store = SqliteStore::open_memory().await.unwrap();
        let mut sub = store.subscribe();
        let row = store.insert_one(&event("EVT-002", Day::One, "Kit")).await.unwrap();
        assert_eq!(sub.next().await, Some(Notification::Inserted(row)));
    }

    #[tokio::test]
    async fn test_closed_pool_is_transport_error() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.close().await;
        assert!(store.ping().await.unwrap_err().is_transport());
        assert!(store
            .insert_one(&event("EVT-001", Day::One, "Kit"))
            .await
            .unwrap_err()
            .is_transport());
    }
}
