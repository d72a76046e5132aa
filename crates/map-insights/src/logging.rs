//! Log setup for the replay binary
//!
//! Logs go to stderr; stdout carries the snapshot stream.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
fn default_directives() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Initialize the global subscriber. Safe to call more than once.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives()));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if initialized && std::env::var("RUST_LOG").is_err() {
        tracing::info!("RUST_LOG set to default: {}", default_directives());
    }
}
