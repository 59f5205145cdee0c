//! Tracing subscriber bootstrap.
//!
//! `RUST_LOG` always wins over the configured default level, so a host can
//! raise verbosity for a single module without editing settings.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed (tests,
/// embedding hosts); the existing subscriber is left untouched.
pub fn init_logging(default_level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(default_level, json, "logging initialized");
    }
    installed
}
