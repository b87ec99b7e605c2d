use std::fs;
use std::io;

use anyhow::{Context, Result};
use bakery_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "bakery.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; each `-v` raises it one step.
/// Console output goes to stderr so command output on stdout stays parseable.
/// The returned guard flushes the log file and must live until exit.
pub fn init_tracing(config: &LoggingConfig, verbosity: u8) -> Result<Option<WorkerGuard>> {
    let level = match verbosity {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };

    let (file_writer, guard) = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        let console = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(io::stderr);
        let file = file_writer.map(|writer| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
        });
        registry
            .with(console)
            .with(file)
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        let console = fmt::layer().with_target(false).with_writer(io::stderr);
        let file = file_writer.map(|writer| {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
        });
        registry
            .with(console)
            .with(file)
            .try_init()
            .context("failed to install tracing subscriber")?;
    }
    Ok(guard)
}
