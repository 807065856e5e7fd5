//! CLI error type

use thiserror::Error;

use salesdw::config::ConfigError;
use salesdw::pipeline::PipelineError;
use salesdw::store::StoreError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{}", .0.user_message())]
    Pipeline(#[from] PipelineError),

    #[error("Run failed after {attempts} attempt(s): {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
