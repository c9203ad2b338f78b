//! Structured logging initialization.
//!
//! The RUST_LOG environment variable takes precedence over the configured
//! level.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Build the level filter, preferring RUST_LOG when it is set.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_str())
    }
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) {
    let filter = env_filter(config);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(true).with_thread_names(true))
                .init();
        }
        (LogFormat::Pretty, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_ansi(true)
                        .with_thread_names(true)
                        .without_time(),
                )
                .init();
        }
        (LogFormat::Json, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        (LogFormat::Json, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().without_time())
                .init();
        }
        (LogFormat::Compact, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_target(false))
                .init();
        }
        (LogFormat::Compact, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_target(false).without_time())
                .init();
        }
    }
}
