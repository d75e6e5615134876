//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set. Otherwise the CLI verbosity picks the filter,
//! falling back to the configured level.

use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;
use crate::errors::{LinkError, Result};

/// Filter directive for a verbosity and configured level
pub fn filter_directive(verbosity: Verbosity, configured_level: &str) -> String {
    match verbosity {
        Verbosity::Quiet => "error".to_string(),
        Verbosity::Normal => format!("warn,superlink={}", configured_level.to_ascii_lowercase()),
        Verbosity::Verbose => "info,superlink=debug".to_string(),
        Verbosity::VeryVerbose => "debug,superlink=trace".to_string(),
    }
}

/// Filter from `RUST_LOG` when present, else from the verbosity directive
pub fn build_filter(verbosity: Verbosity, configured_level: &str) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::try_from_default_env()
            .map_err(|e| LinkError::Config(format!("Invalid RUST_LOG filter: {}", e))),
        Err(_) => EnvFilter::try_new(filter_directive(verbosity, configured_level))
            .map_err(|e| LinkError::Config(format!("Invalid log filter: {}", e))),
    }
}

/// Install the global subscriber, writing to stderr
pub fn init(verbosity: Verbosity, configured_level: &str) -> Result<()> {
    let filter = build_filter(verbosity, configured_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity != Verbosity::Normal)
        .try_init()
        .map_err(|e| LinkError::Generic(format!("Failed to install logger: {}", e)))
}
