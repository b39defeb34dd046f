use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, ConfigError};

pub const LOG_FILE_NAME: &str = "burnware.log";

/// Install the global tracing subscriber
///
/// Logs go to stdout and, when `log_dir` is set, to a daily-rolling file.
/// `RUST_LOG` overrides the configured level. The returned guards must be
/// kept alive for buffered lines to be flushed.
pub fn init_tracing(
    config: &Config,
) -> Result<Vec<tracing_appender::non_blocking::WorkerGuard>, ConfigError> {
    let level = config.level()?;
    let mut guards = Vec::new();

    // Stdout layer
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    // File layer (if log_dir is set)
    let file_layer = match &config.log_dir {
        Some(log_dir) => {
            if let Err(e) = std::fs::create_dir_all(log_dir) {
                eprintln!(
                    "Warning: Failed to create log directory {:?}: {}",
                    log_dir, e
                );
            }

            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guards.push(file_guard);

            let file_env_filter = EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy();

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(file_env_filter),
            )
        }
        None => None,
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: tracing subscriber already installed: {}", e);
    }

    Ok(guards)
}
