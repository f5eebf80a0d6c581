//! Filesystem locations under the rollcall home directory.

use std::path::{Path, PathBuf};
use std::sync::Once;

static HOME_WARNING: Once = Once::new();

/// Home directory for station state: `$ROLLCALL_HOME`, else `~/.rollcall`,
/// else `./.rollcall` when no user home can be found.
pub fn rollcall_home() -> PathBuf {
    if let Some(dir) = std::env::var_os("ROLLCALL_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rollcall")
}

/// Create `home` once per process; failures are reported a single time and
/// left for the caller's own open to surface.
fn prepare(home: &Path) {
    if let Err(err) = std::fs::create_dir_all(home) {
        HOME_WARNING.call_once(|| {
            eprintln!(
                "Warning: cannot create {}: {}. Set ROLLCALL_HOME or pass --config.",
                home.display(),
                err
            );
        });
    }
}

/// `~/.rollcall/records.sqlite`
pub fn default_store_path() -> PathBuf {
    let home = rollcall_home();
    prepare(&home);
    home.join("records.sqlite")
}

/// `~/.rollcall/queue`, the offline queue's key-value directory.
pub fn default_queue_dir() -> PathBuf {
    rollcall_home().join("queue")
}

/// `~/.rollcall/logs`
pub fn default_logs_dir() -> PathBuf {
    let home = rollcall_home();
    prepare(&home);
    home.join("logs")
}

/// `~/.rollcall/config.toml`
pub fn default_config_path() -> PathBuf {
    rollcall_home().join("config.toml")
}
