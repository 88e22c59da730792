//! Time-Related Constants
//!
//! Conversion factors and transport timeouts.

/// Milliseconds per second.
pub const MS_PER_SECOND: i64 = 1000;

/// Default read timeout for serial sources (ms).
///
/// Must be shorter than the gap between two messages and longer than the gap
/// between two bytes of one message, so a timed-out read delimits a message.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Read timeout for the five-line PCE-AQD 20 datasets (ms).
pub const PCE_AQD20_READ_TIMEOUT_MS: u64 = 500;
