//! Tracing subscriber setup

use std::fs;
use std::io;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogSection;

pub const LOG_FILE_PREFIX: &str = "pathwatch.log";

/// Keeps the file writer flushing; hold until exit
#[must_use]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Filter directive for the configured level and `-v` count
pub fn directive(level: &str, verbosity: u8) -> String {
    match verbosity {
        0 => level.to_ascii_lowercase(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over both the config and `-v`. Logs go to stderr, or to a
/// daily file when `log.directory` is set; stdout stays reserved for records.
pub fn init(config: &LogSection, verbosity: u8) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(&config.level, verbosity)));

    let (file_layer, worker) = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let stderr_layer = worker.is_none().then(|| fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LogGuard { _worker: worker })
}
