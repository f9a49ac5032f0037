//! Control messages sent from the master to its workers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical termination signal, independent of how it was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownSignal {
    /// Terminal interrupt (Ctrl+C / SIGINT)
    Interrupt,
    /// Termination request (SIGTERM)
    Terminate,
}

impl ShutdownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages a master may send down a worker's control channel.
///
/// On the wire each message is a single JSON object tagged by `destination`,
/// e.g. `{"destination":"shutdown","event":"interrupt"}`. Anything else is
/// rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "destination", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Synthesize `signal` locally and begin shutdown
    Shutdown {
        #[serde(rename = "event")]
        signal: ShutdownSignal,
    },
}

impl ControlMessage {
    pub fn shutdown(signal: ShutdownSignal) -> Self {
        Self::Shutdown { signal }
    }
}
