// Logging setup
//
// Human-readable logs go to stderr so stdout stays clean for answers and
// JSON output. Optionally a JSON copy is written to rotating files through a
// non-blocking writer.
//
// Precedence: RUST_LOG env var > config file level > "info"

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is not set
pub fn default_directive(level: &str) -> String {
    let level = match level.trim() {
        "" => "info",
        other => other,
    };
    format!("statify={}", level)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let appender = config.file_appender().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Could not open log file in {:?}: {}",
            config.file_dir, e
        );
        None
    });

    let (file_layer, guard) = match appender {
        Some(appender) => {
            // Writes happen on a background thread
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("debug"), "statify=debug");
        assert_eq!(default_directive("  "), "statify=info");
    }

    #[test]
    fn test_default_directive_parses_as_filter() {
        assert!(EnvFilter::try_new(default_directive("warn")).is_ok());
    }
}
