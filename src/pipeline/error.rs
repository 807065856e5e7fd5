//! Error types for pipeline runs
//!
//! Stage errors keep their original cause as a boxed source so the whole
//! chain is available to callers, while [`PipelineError::user_message`]
//! renders a short form for the CLI.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::staging::StagingError;
use crate::store::StoreError;
use crate::warehouse::WarehouseError;

/// Errors that can occur while planning or executing a run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid ETL or pipeline configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A stage raised; no later stage was executed
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The stage graph is not acyclic
    #[error("Circular stage dependency: {0}")]
    Cycle(String),

    /// A stage name that is not part of the graph
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// An execution order that breaks a dependency edge
    #[error("Stage '{before}' must run before '{after}'")]
    OrderViolation { before: String, after: String },

    /// Connecting to a store failed before any stage ran
    #[error("Connection error: {0}")]
    Connection(#[from] StoreError),

    #[error("Run report not found: {0}")]
    ReportNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Wrap a stage's error with the stage name
    pub fn stage_failure<E>(stage: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StageFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Name of the failing stage, for stage failures
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Whether a whole-run retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::StageFailure { .. }
                | PipelineError::Connection(_)
                | PipelineError::IoError(_)
        )
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!("Configuration error: {msg}\n\nHint: Check the config file or SOURCE_*/DW_* environment variables.")
            }
            PipelineError::StageFailure { stage, source } => {
                if let Some(staging) = source.downcast_ref::<StagingError>() {
                    format!("Stage '{stage}' failed: {}", staging.user_message())
                } else {
                    format!("Stage '{stage}' failed: {source}\n\nHint: Every stage is idempotent; re-run the pipeline once the cause is fixed.")
                }
            }
            PipelineError::Cycle(path) => {
                format!("Circular stage dependency: {path}\n\nHint: Remove one of the listed edges.")
            }
            PipelineError::UnknownStage(name) => {
                format!("Unknown stage: {name}\n\nHint: Run `salesdw plan` to list stage names.")
            }
            PipelineError::Connection(err) => {
                format!("Connection error: {err}\n\nHint: Check host, port and credentials.")
            }
            _ => self.to_string(),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        PipelineError::stage_failure("staging", err)
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(err: WarehouseError) -> Self {
        PipelineError::stage_failure("warehouse", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_keeps_source() {
        let err = PipelineError::stage_failure(
            "dim_region",
            WarehouseError::UnexpectedValue {
                column: "region_nk".to_string(),
                value: "abc".to_string(),
            },
        );
        assert_eq!(err.stage_name(), Some("dim_region"));
        assert!(err.to_string().contains("dim_region"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message_hints() {
        let err = PipelineError::UnknownStage("dim_store".to_string());
        assert!(err.user_message().contains("salesdw plan"));

        let err = PipelineError::Cycle("a -> b -> a".to_string());
        assert!(err.user_message().contains("a -> b -> a"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_staging_error_message_is_used() {
        let err = PipelineError::from(StagingError::InvalidConfig("batch_size must be > 0".into()));
        assert_eq!(err.stage_name(), Some("staging"));
        assert!(err.user_message().contains("batch_size"));
    }
}
