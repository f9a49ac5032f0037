//! Configuration validation

use crate::schema::{RawConfig, RawThreads};
use thiserror::Error;

/// Keyword that derives the worker count from the CPU count
pub const AUTO_THREADS: &str = "auto";

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid threads value '{0}': expected a number or \"auto\"")]
    InvalidThreads(String),

    #[error("Worker program cannot be empty")]
    EmptyWorkerProgram,

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(RawThreads::Keyword(keyword)) = &config.cluster.threads
        && parse_threads_keyword(keyword).is_err()
    {
        errors.push(ValidationError::InvalidThreads(keyword.clone()));
    }

    if config.worker.program.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyWorkerProgram);
    }

    if config.cluster.heap_size_mb == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "heap_size_mb",
        });
    }

    if config.cluster.shutdown_timeout_ms == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "shutdown_timeout_ms",
        });
    }

    errors
}

/// Parse the keyword form of `threads`; only "auto" is accepted
pub fn parse_threads_keyword(s: &str) -> Result<(), String> {
    if s.trim().eq_ignore_ascii_case(AUTO_THREADS) {
        Ok(())
    } else {
        Err(format!("Unknown threads keyword: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawClusterConfig, RawWorker};
    use std::path::PathBuf;

    fn raw(cluster: RawClusterConfig, program: &str) -> RawConfig {
        RawConfig {
            config_version: 1,
            cluster,
            worker: RawWorker {
                program: PathBuf::from(program),
                args: vec![],
            },
        }
    }

    #[test]
    fn test_threads_keyword() {
        assert!(parse_threads_keyword("auto").is_ok());
        assert!(parse_threads_keyword("AUTO").is_ok());
        assert!(parse_threads_keyword("many").is_err());
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        let config = raw(
            RawClusterConfig {
                threads: Some(RawThreads::Keyword("auto".into())),
                extra_cpus: Some(2),
                ..Default::default()
            },
            "/srv/app/server",
        );
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_collects_every_error() {
        let config = raw(
            RawClusterConfig {
                threads: Some(RawThreads::Keyword("lots".into())),
                heap_size_mb: Some(0),
                shutdown_timeout_ms: Some(0),
                ..Default::default()
            },
            "",
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidThreads("lots".into())));
        assert!(errors.contains(&ValidationError::EmptyWorkerProgram));
    }
}
