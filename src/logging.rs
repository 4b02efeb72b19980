//! Subscriber setup for demos and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! application's call. This helper exists for binaries and test harnesses that
//! just want readable output.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `bioingest=info`).
///
/// Does nothing if a global subscriber is already set, so calling it from
/// several tests is fine.
pub fn init() {
    init_with_default("bioingest=info");
}

/// Like [`init`], with a custom fallback directive when `RUST_LOG` is unset.
pub fn init_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
