//! `rollcall sync`: one sync pass outside a scanning session.

use super::config::StationConfig;
use super::station::{open_queue, open_store};
use rollcall_station::{ScanCache, ScanStore, SyncEngine};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: &StationConfig, json: bool) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let queue = open_queue(config)?;
    let scan_store: Arc<dyn ScanStore> = store.clone();

    let engine = SyncEngine::new(queue, scan_store).with_cache(ScanCache::new());
    let outcome = engine.sync_now().await;
    let status = engine.status();
    info!(result = outcome.as_str(), "{}", outcome.summary());
    store.close().await;

    if json {
        let value = serde_json::json!({
            "result": outcome.as_str(),
            "summary": outcome.summary(),
            "status": status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Sync {}: {}", outcome.as_str(), outcome.summary());
        if status.quarantined > 0 {
            println!(
                "{} scan(s) quarantined. Inspect with `rollcall queue`, retry with `rollcall queue retry`.",
                status.quarantined
            );
        }
    }

    if outcome.is_failure() {
        anyhow::bail!("Sync failed: {}", outcome.summary());
    }
    Ok(())
}
