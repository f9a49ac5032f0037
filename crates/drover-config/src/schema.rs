//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Pool sizing and shutdown settings
    #[serde(default)]
    pub cluster: RawClusterConfig,

    /// The program each worker runs
    pub worker: RawWorker,
}

/// Cluster-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawClusterConfig {
    /// Worker count: an integer or "auto"; 0 or unset runs single-process
    pub threads: Option<RawThreads>,

    /// Max heap size per worker, in MB
    pub heap_size_mb: Option<u64>,

    /// CPUs to leave free when `threads = "auto"`
    pub extra_cpus: Option<usize>,

    /// How long shutdown listeners get before a forced exit
    pub shutdown_timeout_ms: Option<u64>,
}

/// `threads` accepts either a number or a keyword
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawThreads {
    Count(usize),
    Keyword(String),
}

/// Worker program definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWorker {
    /// Full path to the program that actually runs the server
    pub program: PathBuf,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}
