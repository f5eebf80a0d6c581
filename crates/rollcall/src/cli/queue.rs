//! `rollcall queue`: inspect the offline queue and release quarantined scans.

use super::config::StationConfig;
use super::output::{format_timestamp, print_table};
use super::station::open_queue;
use rollcall_protocol::ScanEvent;

fn entry_json(event: &ScanEvent, state: &str) -> serde_json::Value {
    serde_json::json!({
        "state": state,
        "delegate_id": event.delegate_id.as_str(),
        "day": event.day.number(),
        "purpose": event.purpose,
        "timestamp": event.timestamp.to_rfc3339(),
    })
}

pub fn show(config: &StationConfig, json: bool) -> anyhow::Result<()> {
    let queue = open_queue(config)?;
    let pending = queue.snapshot()?;
    let quarantined = queue.quarantined()?;

    if json {
        let value = serde_json::json!({
            "queue_dir": config.queue_dir.to_string_lossy(),
            "pending": pending.len(),
            "quarantined": quarantined.len(),
            "entries": pending
                .iter()
                .map(|e| entry_json(e, "pending"))
                .chain(quarantined.iter().map(|e| entry_json(e, "quarantined")))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if pending.is_empty() && quarantined.is_empty() {
        println!("Offline queue is empty.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = pending
        .iter()
        .map(|e| ("pending", e))
        .chain(quarantined.iter().map(|e| ("quarantined", e)))
        .map(|(state, e)| {
            vec![
                state.to_string(),
                e.delegate_id.to_string(),
                e.day.to_string(),
                e.purpose.clone(),
                format_timestamp(e.timestamp),
            ]
        })
        .collect();
    print_table(&["STATE", "DELEGATE", "DAY", "PURPOSE", "SCANNED AT"], rows);
    println!();
    println!("{} pending, {} quarantined", pending.len(), quarantined.len());
    Ok(())
}

pub fn retry(config: &StationConfig) -> anyhow::Result<()> {
    let queue = open_queue(config)?;
    let moved = queue.requeue_quarantined()?;
    if moved == 0 {
        println!("No quarantined scans.");
    } else {
        println!(
            "Requeued {} scan(s); they go out with the next sync ({} pending).",
            moved,
            queue.len()
        );
    }
    Ok(())
}
