//! Process-wide logging setup shared by every binary and test harness.

pub mod logging;

pub use logging::{LogFormat, LogSettings};

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init(&LogSettings::from_env());
}
