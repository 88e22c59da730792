//! Plausibility Bounds
//!
//! Ranges outside of which a decoded value is treated as a wiring or sensor
//! fault rather than a real reading. Tighter than the sensors' datasheet
//! ranges, since the loggers sit indoors or in a sheltered outdoor box.

// ===== TEMPERATURE =====

/// Lowest plausible air temperature (°C).
pub const TEMP_PLAUSIBLE_MIN_C: f64 = -30.0;

/// Highest plausible air temperature (°C).
pub const TEMP_PLAUSIBLE_MAX_C: f64 = 80.0;

// ===== PRESSURE =====

/// Lowest plausible barometric pressure (hPa).
///
/// Below any recorded sea-level pressure; anything lower is a sensor fault
/// for a station near ground level.
pub const PRESSURE_PLAUSIBLE_MIN_HPA: f64 = 800.0;

/// Highest plausible barometric pressure (hPa).
pub const PRESSURE_PLAUSIBLE_MAX_HPA: f64 = 1200.0;

// ===== HUMIDITY =====

/// Relative humidity cannot be negative (%).
pub const HUMIDITY_PLAUSIBLE_MIN_PCT: f64 = 0.0;

/// Saturated air (%).
pub const HUMIDITY_PLAUSIBLE_MAX_PCT: f64 = 100.0;

// ===== EVERYTHING ELSE =====

/// Concentrations, counts and timestamps are never negative.
pub const GENERIC_PLAUSIBLE_MIN: f64 = 0.0;
