//! Tracing subscriber initialization.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable single-line records.
    #[default]
    Compact,
    /// One JSON object per record.
    Json,
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug`
/// with `verbose`. Logs go to stderr so stdout stays free for decisions.
/// Calling this twice is harmless; the second call logs a warning.
pub fn init_logging(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let init_result = match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(false),
            )
            .try_init(),
    };

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; keeping existing subscriber");
    }
}
