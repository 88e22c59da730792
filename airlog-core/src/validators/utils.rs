//! Common Validation Utilities
//!
//! ## Overview
//!
//! Small pure helpers shared by the filters. None of them allocate or log.
//!
//! ### Range Validation
//! A value passes when it is present and inside the (optionally open-ended)
//! bounds. An absent value never passes:
//! ```rust
//! use airlog_core::validators::utils::check_range;
//!
//! assert!(check_range(Some(21.5), Some(-30.0), Some(80.0)));
//! assert!(!check_range(None, Some(-30.0), Some(80.0)));
//! assert!(check_range(Some(1e9), Some(0.0), None));
//! ```
//!
//! ### Rate-of-Change Validation
//! Rates are absolute and per second. A zero or negative time delta means the
//! samples are simultaneous (or the clock went backwards) and yields a rate of
//! zero rather than a division blow-up.

use crate::constants::time::MS_PER_SECOND;

/// Whether `value` is present and within `[min, max]`; a `None` bound is open
pub fn check_range(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(value) = value else {
        return false;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Absolute rate of change per second
pub fn calculate_rate(current: f64, previous: f64, time_delta_ms: i64) -> f64 {
    if time_delta_ms <= 0 {
        return 0.0;
    }

    let value_delta = libm::fabs(current - previous);
    value_delta * MS_PER_SECOND as f64 / time_delta_ms as f64
}

/// A value with the time it was captured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedReading {
    pub value: f64,
    pub timestamp: i64,
}

/// Rate of change between a stored reading and a new one
pub fn calculate_rate_from_reading(current_value: f64, current_time: i64, last: &TimestampedReading) -> f64 {
    calculate_rate(current_value, last.value, current_time.saturating_sub(last.timestamp))
}
