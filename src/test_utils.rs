//! Helpers shared by the unit tests.

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
///
/// `RUST_LOG` controls the filter; the default keeps the crate at `trace`.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        #[cfg(feature = "tracing-integration")]
        {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nfc_llcp_core=trace"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .with_thread_names(true)
                .try_init();
        }
    });
}

/// Marks the start of a test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = %$name, "=== TEST START ===");
    };
}

/// Marks a named section inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::tracing_compat::debug!(section = %$name, "--- section ---");
    };
}

/// Marks the successful end of a test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = %$name, "=== TEST COMPLETE ===");
    };
}

/// Asserts `cond`, logging the expectation first so failures carry context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {{
        let passed: bool = $cond;
        $crate::tracing_compat::debug!(
            check = %$what,
            expected = ?$expected,
            actual = ?$actual,
            passed,
            "assertion"
        );
        assert!(
            passed,
            "{}: expected {:?}, got {:?}",
            $what, $expected, $actual
        );
    }};
}
