//! Process-wide tracing setup shared by every tagstream binary and test.

pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// JSON logs filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

/// Human-readable logs captured by the test harness.
pub fn init_for_tests() {
    tracing::init(&LogSettings {
        format: LogFormat::Pretty,
        default_filter: "debug".to_string(),
        test_writer: true,
    });
}
