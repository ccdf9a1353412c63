//! Process-wide tracing setup shared by binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, ParseLogFormatError, init_with};

/// Initialize tracing with JSON output.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    init_with(LogFormat::Json);
}
