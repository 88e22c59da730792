//! Constants for airlog Core
//!
//! Centralized numeric values used by the decoders, the acquisition loops,
//! the reducer and the plausibility check. Every value carries its unit in
//! its name.
//!
//! ## Organization
//!
//! - **Sensors**: plausibility bounds per measurement
//! - **Time**: unit conversions and default read timeouts
//! - **Buffers**: window capacities

/// Plausibility bounds for decoded measurements.
pub mod sensors;

/// Time unit conversions and transport timeouts.
pub mod time;

/// Window and frame buffer sizes.
pub mod buffers;

pub use sensors::{
    TEMP_PLAUSIBLE_MIN_C, TEMP_PLAUSIBLE_MAX_C,
    PRESSURE_PLAUSIBLE_MIN_HPA, PRESSURE_PLAUSIBLE_MAX_HPA,
    HUMIDITY_PLAUSIBLE_MIN_PCT, HUMIDITY_PLAUSIBLE_MAX_PCT,
    GENERIC_PLAUSIBLE_MIN,
};

pub use time::{MS_PER_SECOND, DEFAULT_READ_TIMEOUT_MS};

pub use buffers::{DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
