//! Logging Infrastructure
//!
//! Structured logging setup for development (pretty) and production (JSON).

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with `info` level and human-readable output
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON output and file output
///
/// `RUST_LOG` takes precedence over `log_level` when set.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let writer_dir = log_dir
        .map(Path::new)
        .filter(|p| p.exists())
        .and_then(|p| p.to_str());

    let result = match (json.unwrap_or(false), writer_dir) {
        (true, Some(dir)) => builder
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, "fulfillment"))
            .try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(dir)) => builder
            .with_writer(tracing_appender::rolling::daily(dir, "fulfillment"))
            .try_init(),
        (false, None) => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("logger already initialized: {}", e);
    }
}
