//! Session naming and logging helpers for tests

use chrono::Utc;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Generate a unique session id for test resources.
///
/// Format: `test-{timestamp_ms}-{counter}`, unique even when tests start
/// simultaneously.
///
/// # Example
///
/// ```
/// use harness_test_utils::test_session_id;
///
/// let id = test_session_id();
/// assert!(id.starts_with("test-"));
/// ```
pub fn test_session_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

/// Route `tracing` output through the test harness's captured writer.
///
/// Honors `RUST_LOG`, defaulting to `debug`. Safe to call from every test.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
