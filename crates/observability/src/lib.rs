//! Tracing and logging setup shared by the worker and tests.

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::Json);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, UnknownLogFormat, init as init_with};
