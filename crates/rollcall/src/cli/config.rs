//! Station configuration
//!
//! Read from `~/.rollcall/config.toml` (or `--config`). Every field has a
//! default, so a missing file is a valid configuration.

use anyhow::Context;
use rollcall_protocol::defaults::{
    DEFAULT_FEEDBACK_RESET_MILLIS, DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
use rollcall_protocol::paths::{
    default_config_path, default_logs_dir, default_queue_dir, default_store_path, rollcall_home,
};
use rollcall_protocol::PermissionTable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    /// Record store URL, `sqlite:<path>`
    pub store_url: String,
    /// Key-value directory holding the offline queue
    pub queue_dir: PathBuf,
    /// Operator signed in at this station
    pub user: Option<String>,
    pub sync_interval_secs: u64,
    pub probe_interval_secs: u64,
    pub feedback_reset_millis: u64,
    /// Per-user overrides of the built-in permission table
    pub permissions: PermissionTable,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            store_url: format!("sqlite:{}", default_store_path().display()),
            queue_dir: default_queue_dir(),
            user: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            feedback_reset_millis: DEFAULT_FEEDBACK_RESET_MILLIS,
            permissions: PermissionTable::default(),
        }
    }
}

impl StationConfig {
    /// Load from `path`, or the default location. Returns the path consulted.
    pub fn load(path: Option<&Path>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            return Ok((Self::default(), path));
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok((config, path))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.sync_interval_secs == 0 || config.probe_interval_secs == 0 {
            anyhow::bail!("sync_interval_secs and probe_interval_secs must be greater than 0");
        }
        Ok(config)
    }

    /// Built-in permission table with this config's overrides applied.
    pub fn permission_table(&self) -> PermissionTable {
        PermissionTable::builtin().merged(&self.permissions)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn feedback_reset(&self) -> Duration {
        Duration::from_millis(self.feedback_reset_millis)
    }
}

/// Arguments for the config command
#[derive(Debug)]
pub struct ConfigArgs {
    pub json: bool,
}

/// Run the config command - shows resolved settings and paths
pub fn run(args: ConfigArgs, config: &StationConfig, config_path: &Path) -> anyhow::Result<()> {
    let home = rollcall_home();
    let logs = default_logs_dir();
    let users: Vec<String> = config
        .permission_table()
        .users()
        .map(str::to_string)
        .collect();

    if args.json {
        let value = serde_json::json!({
            "home": home.to_string_lossy(),
            "config": {
                "path": config_path.to_string_lossy(),
                "exists": config_path.exists(),
            },
            "store_url": config.store_url,
            "queue_dir": config.queue_dir.to_string_lossy(),
            "logs_dir": logs.to_string_lossy(),
            "user": config.user,
            "sync_interval_secs": config.sync_interval_secs,
            "probe_interval_secs": config.probe_interval_secs,
            "feedback_reset_millis": config.feedback_reset_millis,
            "permission_users": users,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let exists = if config_path.exists() { "" } else { " (not found, using defaults)" };
    println!("ROLLCALL CONFIGURATION");
    println!();
    println!("Home:         {}", home.display());
    println!("Config:       {}{}", config_path.display(), exists);
    println!("Record store: {}", config.store_url);
    println!("Queue:        {}", config.queue_dir.display());
    println!("Logs:         {}", logs.display());
    println!();
    println!("Operator:     {}", config.user.as_deref().unwrap_or("(none)"));
    println!("Sync every:   {}s", config.sync_interval_secs);
    println!("Probe every:  {}s", config.probe_interval_secs);
    println!("Feedback:     {}ms", config.feedback_reset_millis);
    println!("Profiles:     {}", users.join(", "));
    Ok(())
}
