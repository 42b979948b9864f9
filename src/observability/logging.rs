//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a configured level is usable.
pub const DEFAULT_DIRECTIVE: &str = "origin_dispatch=info,tower_http=info";

/// Build the filter from the environment, falling back to `level` for this crate.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("origin_dispatch={level},tower_http={level}")))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: &str) {
    let result = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_applied() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = env_filter("debug").to_string();
        assert!(filter.contains("origin_dispatch=debug"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging("info");
        init_logging("info");
    }
}
