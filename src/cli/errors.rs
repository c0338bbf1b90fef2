//! CLI error types
//!
//! Every CLI error ends the process with a non-zero exit status.

use std::io;
use std::path::PathBuf;

use crate::failure::Failure;
use crate::observability::LoggingError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data directory already initialized: {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("data directory not initialized: {}. Run 'mqstore init' first.", .0.display())]
    NotInitialized(PathBuf),

    #[error(transparent)]
    Failure(#[from] Failure),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "MQ_CLI_CONFIG_ERROR",
            Self::Io(_) | Self::Json(_) => "MQ_CLI_IO_ERROR",
            Self::AlreadyInitialized(_) => "MQ_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized(_) => "MQ_CLI_NOT_INITIALIZED",
            Self::Failure(failure) => failure.kind().as_str(),
            Self::Logging(_) => "MQ_CLI_LOGGING_ERROR",
        }
    }
}

/// Storage errors reach the CLI as the server-scoped failure the store
/// would report.
impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        Self::Failure(Failure::from(err))
    }
}

pub type CliResult<T> = Result<T, CliError>;
