//! Logging setup shared by both demo binaries.
//!
//! Logs go to stderr; stdout carries the demo output.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber.
///
/// `RUST_LOG` wins when set, otherwise `default_level` is used.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
