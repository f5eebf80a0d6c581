//! `rollcall roster`: load and list the delegate roster.

use super::config::StationConfig;
use super::error::HelpfulError;
use super::output::print_table;
use super::station::open_store;
use anyhow::Context;
use rollcall_protocol::Delegate;
use rollcall_station::RosterStore;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: String,
    name: String,
    #[serde(default)]
    organization: Option<String>,
}

/// Parse a roster CSV with a header row naming `id`, `name` and optionally
/// `organization`. Rows with a blank id are skipped.
fn read_roster(path: &Path) -> anyhow::Result<Vec<Delegate>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open roster file {}", path.display()))?;

    let mut delegates = Vec::new();
    for record in reader.deserialize::<RosterRow>() {
        let row = record.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            HelpfulError::csv_parse_error(path, line, &e.to_string())
        })?;
        if row.id.trim().is_empty() {
            continue;
        }
        let mut delegate = Delegate::new(row.id.as_str(), row.name);
        if let Some(org) = row.organization.filter(|o| !o.is_empty()) {
            delegate = delegate.with_organization(org);
        }
        delegates.push(delegate);
    }
    Ok(delegates)
}

pub async fn import(config: &StationConfig, file: &Path) -> anyhow::Result<()> {
    let delegates = read_roster(file)?;
    if delegates.is_empty() {
        anyhow::bail!("No delegates found in {}", file.display());
    }

    let store = open_store(config).await?;
    let written = store
        .import_delegates(&delegates)
        .await
        .context("Failed to import roster")?;
    let total = store.delegate_count().await?;
    store.close().await;

    println!(
        "Imported {} delegate(s) from {} ({} in roster)",
        written,
        file.display(),
        total
    );
    Ok(())
}

pub async fn list(config: &StationConfig, json: bool) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let delegates = store
        .list_delegates()
        .await
        .context("Failed to load roster")?;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&delegates)?);
        return Ok(());
    }

    if delegates.is_empty() {
        println!("Roster is empty. Load one with `rollcall roster import <file.csv>`.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = delegates
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.name.clone(),
                d.organization.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "ORGANIZATION"], rows);
    println!();
    println!("{} delegate(s)", delegates.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_roster_normalizes_and_skips_blank_ids() {
        let file = write_csv("id,name,organization\n evt-001 , Asha Rao , Acme\n,Nobody,\nEVT-002,Ben Ode,\n");
        let delegates = read_roster(file.path()).unwrap();
        assert_eq!(delegates.len(), 2);
        assert_eq!(delegates[0].id.as_str(), "EVT-001");
        assert_eq!(delegates[0].name, "Asha Rao");
        assert_eq!(delegates[0].organization.as_deref(), Some("Acme"));
        assert_eq!(delegates[1].organization, None);
    }

    #[test]
    fn test_organization_column_is_optional() {
        let file = write_csv("id,name\nEVT-010,Chen Li\n");
        let delegates = read_roster(file.path()).unwrap();
        assert_eq!(delegates.len(), 1);
        assert_eq!(delegates[0].organization, None);
    }

    #[test]
    fn test_missing_name_column_is_helpful_error() {
        let file = write_csv("id,label\nEVT-010,Chen Li\n");
        let err = read_roster(file.path()).unwrap_err();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert!(helpful.message.contains("CSV parse error"));
    }
}
