//! Structured logging setup.
//!
//! The scheduler only emits `tracing` events; applications normally install
//! their own subscriber. These helpers are for binaries and tests that want
//! a sensible default.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset: pool lifecycle at `info`.
pub const DEFAULT_LOG_DIRECTIVE: &str = "resource_scheduler=info";

/// Install an fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_DIRECTIVE`]. Does nothing if a global subscriber exists.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_DIRECTIVE);
}

/// Like [`init_tracing`], with a caller-chosen fallback directive such as
/// `"resource_scheduler=debug"` to see per-item scheduling decisions.
pub fn init_tracing_with(fallback: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // Worker threads are named "<pool>-worker-<id>".
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
