//! Configuration parsing and validation for drover
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Fixed or CPU-derived worker counts
//! - Per-worker heap ceilings and shutdown timeout
//! - Validation with clear error messages
//!
//! Embedding applications can also build a [`ClusterConfig`] directly.

mod cluster;
mod schema;
mod validation;

pub use cluster::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ClusterConfig> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ClusterConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ClusterConfig::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [worker]
            program = "/srv/app/server"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.threads, Threads::Fixed(0));
        assert!(!config.threads.is_clustered());
        assert_eq!(config.worker.program.to_str(), Some("/srv/app/server"));
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [cluster]
            threads = 4
            heap_size_mb = 512
            shutdown_timeout_ms = 500

            [worker]
            program = "/srv/app/server"
            args = ["--port", "8080"]
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.threads, Threads::Fixed(4));
        assert_eq!(config.heap_size_mb, Some(512));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
        assert_eq!(config.worker.args, vec!["--port", "8080"]);
    }

    #[test]
    fn parse_auto_threads() {
        let config = r#"
            config_version = 1

            [cluster]
            threads = "auto"
            extra_cpus = 2

            [worker]
            program = "app"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.threads, Threads::Auto);
        assert_eq!(config.worker_count(8), 6);
        assert_eq!(config.worker_count(1), 1);
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [worker]
            program = "app"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_unknown_threads_keyword() {
        let config = r#"
            config_version = 1

            [cluster]
            threads = "lots"

            [worker]
            program = "app"
        "#;

        assert!(matches!(
            parse_config(config),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "config_version = 1\n[cluster]\nthreads = 0\n[worker]\nprogram = \"app\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.threads, Threads::Fixed(0));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
