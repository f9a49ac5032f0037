//! Control channel for drover
//!
//! Provides:
//! - NDJSON (newline-delimited JSON) framing of [`ControlMessage`]s
//! - A blocking writer for the master side (a worker's stdin pipe)
//! - An async reader for the worker side
//!
//! [`ControlMessage`]: drover_api::ControlMessage

mod codec;
mod reader;

pub use codec::*;
pub use reader::*;

use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

pub type IpcResult<T> = Result<T, IpcError>;
