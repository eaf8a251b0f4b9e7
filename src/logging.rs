//! Tracing subscriber setup for the binary.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

pub const LOG_FILE_NAME: &str = "deckforge.log";

/// Filter for `level`. `RUST_LOG` wins when set.
pub fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { level };
    EnvFilter::new(format!("deckforge={level},tower_http={level},warn"))
}

/// Install the global subscriber: stderr plus an optional daily file.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init(
    settings: &LoggingSection,
    log_dir: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let terminal_layer = if settings.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&settings.level, verbose))
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .with_filter(env_filter(&settings.level, verbose))
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(writer)
                .with_filter(env_filter(&settings.level, verbose))
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(dir) = log_dir {
        tracing::debug!(path = %dir.join(LOG_FILE_NAME).display(), "File logging enabled");
    }
    Ok(guard)
}
