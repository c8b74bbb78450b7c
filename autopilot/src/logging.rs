//! Tracing setup for the CLI.
//!
//! Logs go to stderr; stdout is reserved for command output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "autopilot=info";

/// Initialize the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to [`DEFAULT_FILTER`]. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=autopilot=debug autopilot run --once
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
