//! Logging setup. Events go to stderr; stdout carries JSON only.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "DECKFORGE_LOG";

/// Filter from `DECKFORGE_LOG`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(verbose: bool) {
    let filter = if verbose { EnvFilter::new("debug") } else { env_filter() };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
