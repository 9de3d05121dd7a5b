//! Logging initialization
//!
//! Console output always, plus an optional plain-text file sink. `RUST_LOG`
//! wins over the configured level; `-v` flags raise the configured level.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Level used when `verbosity` flags are given on the command line.
pub fn effective_level(configured: &str, verbosity: u8) -> &str {
    match verbosity {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// # Arguments
/// * `level` - Level or filter directive from the config (`info`, `sarafancore=debug`)
/// * `verbosity` - Number of `-v` flags
/// * `log_file` - Optional file that receives a copy of every record
pub fn init_logger(level: &str, verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::try_new(effective_level(level, verbosity))
            .with_context(|| format!("Invalid log level {level:?}"))?,
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).context("Failed to initialize logger")?;

    // teloxide and r2d2 log through the `log` facade
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level("warn", 0), "warn");
        assert_eq!(effective_level("warn", 1), "debug");
        assert_eq!(effective_level("warn", 2), "trace");
        assert_eq!(effective_level("info", 5), "trace");
    }
}
