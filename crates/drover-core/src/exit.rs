//! Process termination seam

use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Ends the current process.
///
/// The real implementation never returns; test doubles record the code and
/// return so the caller can be observed afterwards.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Terminates via [`std::process::exit`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        info!(code, "Exiting");
        std::process::exit(code);
    }
}

/// Records exit requests instead of exiting
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every code passed to [`ProcessExit::exit`], in call order
    pub fn codes(&self) -> Vec<i32> {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn first(&self) -> Option<i32> {
        self.codes().first().copied()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code);
    }
}
