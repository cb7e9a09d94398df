//! Tracing setup for processes embedding the exception log.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the host installs a subscriber, either its own or the one built here.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where tracing output goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TracingOutput {
    #[default]
    Stderr,
    /// Daily rolling files `<prefix>.<date>` under `directory`.
    File { directory: PathBuf, prefix: String },
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `"info"` or `"distinct_exception_log=trace"`.
    pub filter: String,
    pub output: TracingOutput,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            output: TracingOutput::Stderr,
        }
    }
}

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid tracing filter: {0}")]
    InvalidFilter(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Installs a global subscriber for `config`.
///
/// For file output the returned guard must be kept alive; dropping it flushes
/// and stops the background writer.
pub fn init_tracing(config: &TracingConfig) -> Result<Option<WorkerGuard>, TracingError> {
    let filter =
        EnvFilter::try_new(&config.filter).map_err(|e| TracingError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    match &config.output {
        TracingOutput::Stderr => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|_| TracingError::AlreadyInitialized)?;
            Ok(None)
        }
        TracingOutput::File { directory, prefix } => {
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|_| TracingError::AlreadyInitialized)?;
            Ok(Some(guard))
        }
    }
}
