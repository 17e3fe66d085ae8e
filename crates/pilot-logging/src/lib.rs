//! # pilot-logging
//!
//! `tracing` subscriber setup for the relay binary and an in-memory capture
//! layer for tests.
//!
//! All output goes to stderr; stdout belongs to the controller's stdio
//! protocol.

#![deny(unsafe_code)]

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a compact, human-readable stderr subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Install a JSON stderr subscriber, one object per event.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true);

    let _ = subscriber.try_init();
}

/// Run `f` with a temporary warn-level stderr subscriber installed on this
/// thread.
///
/// Used while settings load, before the configured subscriber exists, so
/// warnings about rejected values still reach the operator.
pub fn with_bootstrap_subscriber<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }

    #[test]
    fn bootstrap_subscriber_shows_warnings() {
        let (warn_enabled, debug_enabled) = with_bootstrap_subscriber(|| {
            (
                tracing::enabled!(tracing::Level::WARN),
                tracing::enabled!(tracing::Level::DEBUG),
            )
        });
        assert!(warn_enabled);
        assert!(!debug_enabled);
    }

    #[test]
    fn bootstrap_subscriber_returns_closure_value() {
        assert_eq!(with_bootstrap_subscriber(|| 42), 42);
    }
}
