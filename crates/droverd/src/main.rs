//! droverd - run a program as a supervised pool of workers
//!
//! The top-level process supervises; the processes it spawns are the same
//! binary, told apart by the worker ID in their environment.

use anyhow::{Context, Result};
use clap::Parser;
use drover_api::EventLog;
use drover_config::{Threads, load_config};
use drover_util::{CONFIG_PATH_ENV, default_config_path};
use droverd::Cluster;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// droverd - Run a program as a pool of respawned worker processes
#[derive(Parser, Debug)]
#[command(name = "droverd")]
#[command(about = "Run a program as a pool of respawned worker processes", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/drover/config.toml)
    #[arg(short, long, env = CONFIG_PATH_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Worker count override: a number, or "auto"
    #[arg(short, long)]
    threads: Option<Threads>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    let config = config.with_log(EventLog::tracing());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        "droverd starting"
    );

    Cluster::new(config)
        .run()
        .await
        .context("Cluster failed")
}
