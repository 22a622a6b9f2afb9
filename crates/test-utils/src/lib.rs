//! Shared helpers for `procflow` tests: definition builders, a
//! deterministic harness around the core, and a recording timer backend
//! for the async shell.

pub mod builders;
pub mod fake_timers;
pub mod harness;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static TRACING: Once = Once::new();

/// Upper bound for any single awaited step in async tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and only shown for failures. Filter with
/// `PROCFLOW_LOG`, e.g. `PROCFLOW_LOG=procflow::engine=trace`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env("PROCFLOW_LOG")
            .unwrap_or_else(|_| EnvFilter::new("procflow=debug,warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `fut`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, fut).await {
        Ok(out) => out,
        Err(_) => panic!("test step did not finish within {TEST_TIMEOUT:?}"),
    }
}
