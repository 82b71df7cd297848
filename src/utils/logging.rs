//! Logging bootstrap
//!
//! Optional helper for embedding applications that don't install their own
//! tracing subscriber. The engine itself only emits through the `tracing`
//! macros and never installs a global subscriber on its own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize a default tracing subscriber.
///
/// Honors `RUST_LOG` when set, otherwise logs the engine at debug level.
/// Returns an error string if a global subscriber is already installed.
pub fn init() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_replay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| e.to_string())
}
