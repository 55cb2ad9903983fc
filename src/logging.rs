//! Tracing setup for the poller binary.
//!
//! Logs go to stderr so that stdout carries nothing but the result stream.
//! `RUST_LOG` takes precedence over the configured level.

use std::fmt;

use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

use crate::error::{ModbusError, ModbusResult};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Build the level filter, preferring `RUST_LOG` when it is set.
pub fn env_filter(level: &str) -> ModbusResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| ModbusError::configuration(format!("Invalid log level {:?}: {}", level, e))),
    }
}

/// Install the global subscriber.
pub fn init_tracing(level: &str, format: LogFormat) -> ModbusResult<()> {
    let filter = env_filter(level)?;

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(tracing_fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(tracing_fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    installed.map_err(|e| ModbusError::configuration(format!("Failed to initialize tracing: {}", e)))
}
