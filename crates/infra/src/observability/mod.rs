//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Binaries and tests call
//! [`init_tracing`] once to print them.

use ledgerlink_domain::constants::DEFAULT_LOG_FILTER;
use ledgerlink_domain::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, else the configured directive, else `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install a global `fmt` subscriber.
///
/// Returns `false` when a subscriber was already installed, which is not an
/// error for callers that initialise more than once.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config)).with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(false).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(filter = %config.filter, json = config.json, "observability.tracing_initialized");
    }
    installed
}
