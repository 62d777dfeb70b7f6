//! Structured logging with `tracing`.
//!
//! - [`LogLevel`] / [`LogFormat`] describe the configured output
//! - [`init_subscriber`] installs the global subscriber (stderr)
//! - [`capture_logs`] installs a thread-local capturing subscriber for tests
//!
//! `RUST_LOG` always wins over the configured level.

pub mod capture;
pub mod types;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};
pub use types::{LogFormat, LogLevel};

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()))
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at startup. Later calls are no-ops.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    let filter = build_filter(level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when a global subscriber already exists
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}
