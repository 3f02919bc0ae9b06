//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing
//! events and wants them captured by the test harness.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: workspace crates at debug,
/// everything else at info.
const DEFAULT_FILTER: &str = "supctl_client=debug,supctl_test_utils=debug,info";

/// Initialise a compact tracing subscriber that writes to the test-harness
/// writer and respects the `RUST_LOG` environment variable.
///
/// Safe to call multiple times; subsequent calls are silently ignored.
pub fn init_test_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}
