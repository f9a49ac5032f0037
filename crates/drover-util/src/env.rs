//! Environment contract between a master and its workers
//!
//! The master marks every process it spawns with [`WORKER_ID_ENV`]; a process
//! that finds the variable set knows it is not the top-level supervisor.
//! Pool-wide runtime settings, such as the heap ceiling, travel the same way.

use std::path::PathBuf;
use tracing::warn;

use crate::WorkerId;

/// Set by the master on each spawned worker; holds the worker's [`WorkerId`]
pub const WORKER_ID_ENV: &str = "DROVER_WORKER_ID";

/// Per-worker heap ceiling in megabytes, set on workers when configured
pub const HEAP_LIMIT_ENV: &str = "DROVER_HEAP_LIMIT_MB";

/// Environment variable for overriding the config file path
pub const CONFIG_PATH_ENV: &str = "DROVER_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "drover";

/// Returns this process's worker ID if it was spawned by a drover master.
///
/// An unparseable value still marks the process as a worker; the ID then
/// falls back to 0.
pub fn worker_id_from_env() -> Option<WorkerId> {
    let raw = std::env::var(WORKER_ID_ENV).ok()?;
    match raw.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(value = %raw, error = %e, "Malformed worker ID in environment");
            Some(WorkerId::new(0))
        }
    }
}

/// Whether this process is the top-level (supervising) process
pub fn is_top_level() -> bool {
    std::env::var_os(WORKER_ID_ENV).is_none()
}

/// Heap ceiling handed down by the master, if any
pub fn heap_limit_from_env() -> Option<u64> {
    let raw = std::env::var(HEAP_LIMIT_ENV).ok()?;
    match raw.trim().parse() {
        Ok(mb) => Some(mb),
        Err(e) => {
            warn!(value = %raw, error = %e, "Ignoring malformed heap limit");
            None
        }
    }
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/drover/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/drover/config.toml`
/// 3. `./drover.toml` (no home directory)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("drover.toml")
}
