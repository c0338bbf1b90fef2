//! Process-wide structured logging
//!
//! Filter directives come from `MQSTORE_LOG` (same syntax as `RUST_LOG`),
//! defaulting to `info`. Debug builds log human-readable lines, release
//! builds log JSON.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub const LOG_ENV_VAR: &str = "MQSTORE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid MQSTORE_LOG directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::FromEnvError),
    #[error("global subscriber already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

fn env_filter() -> Result<EnvFilter, LoggingError> {
    Ok(EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?)
}

/// Install the global subscriber. Call once, at process start.
pub fn init_logging() -> Result<(), LoggingError> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(env_filter()?)
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(env_filter()?)
        .finish()
        .try_init()?;

    Ok(())
}
