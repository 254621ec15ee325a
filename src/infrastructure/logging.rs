//! Logging initialization
//!
//! Console output always; optional JSON formatting and daily-rotated file
//! output. File writer guards are parked in a process-wide holder so the
//! non-blocking writer stays alive for the life of the process.

use anyhow::Result;
use once_cell::sync::Lazy;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::infrastructure::config::LoggingConfig;

static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the existing subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = if config.json_format {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let file_layer = config.file_dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "partscout.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    });

    if Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("logging already initialized; keeping existing subscriber");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_tolerated() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn file_output_creates_log_directory_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file_dir: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
