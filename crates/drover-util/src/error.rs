//! Error types for drover

use thiserror::Error;

/// Core error type for drover operations
#[derive(Debug, Error)]
pub enum DroverError {
    #[error("Spawn error: {0}")]
    SpawnError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Host error: {0}")]
    HostError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DroverError {
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::SpawnError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DroverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_variants() {
        assert!(matches!(DroverError::spawn("x"), DroverError::SpawnError(m) if m == "x"));
        assert!(matches!(DroverError::ipc("y"), DroverError::IpcError(_)));
        assert_eq!(
            DroverError::internal("pool gone").to_string(),
            "Internal error: pool gone"
        );
    }
}
