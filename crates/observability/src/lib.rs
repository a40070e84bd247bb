//! Process-wide logging setup.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Install the global subscriber.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init(format: LogFormat) {
    crate::tracing::init(format);
}
