//! Opening the record store and the offline queue from configuration.

use super::config::StationConfig;
use super::error::HelpfulError;
use rollcall_db::SqliteStore;
use rollcall_station::{FileStorage, OfflineQueue};
use std::sync::Arc;

pub async fn open_store(config: &StationConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::open_url(&config.store_url)
        .await
        .map_err(|e| HelpfulError::store_unavailable(&config.store_url, &e.to_string()))?;
    Ok(Arc::new(store))
}

pub fn open_queue(config: &StationConfig) -> anyhow::Result<Arc<OfflineQueue>> {
    let storage = FileStorage::open(&config.queue_dir)
        .map_err(|e| HelpfulError::queue_unavailable(&config.queue_dir, &e.to_string()))?;
    let queue = OfflineQueue::open(storage)
        .map_err(|e| HelpfulError::queue_unavailable(&config.queue_dir, &e.to_string()))?;
    Ok(Arc::new(queue))
}
