//! Tracing setup for test runs.
//!
//! The engine itself only emits through `tracing` macros; wiring a
//! subscriber is left to whoever hosts it. Harness binaries and
//! integration tests that just want to see poll attempts on the console
//! call [`init`] once at startup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize compact console logging.
///
/// `RUST_LOG` takes precedence when set. Safe to call from every test;
/// later calls are no-ops.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchd_state_test={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
