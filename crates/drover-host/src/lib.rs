//! Host adapter for drover
//!
//! Provides:
//! - Worker process spawning with a piped control channel
//! - Graceful (SIGTERM) and forceful termination
//! - Exit observation
//! - Heap ceiling via resource limits
//! - Signal sources for the shutdown bridge

mod adapter;
mod process;
mod signals;

pub use adapter::*;
pub use process::*;
pub use signals::*;

use drover_ipc::IpcError;
use drover_util::DroverError;
use thiserror::Error;

/// Host errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Signal delivery failed: {0}")]
    SignalFailed(String),

    #[error("Resource limit failed: {0}")]
    LimitFailed(String),

    #[error("Process not running: {0}")]
    NotRunning(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ipc(#[from] IpcError),
}

pub type HostResult<T> = Result<T, HostError>;

impl From<HostError> for DroverError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::SpawnFailed(msg) => DroverError::spawn(msg),
            HostError::Ipc(e) => DroverError::ipc(e.to_string()),
            other => DroverError::host(other.to_string()),
        }
    }
}
