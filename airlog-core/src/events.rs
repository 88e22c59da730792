//! Measurement and Event Types
//!
//! ## Overview
//!
//! Everything that flows from a decoder to a sink is one of three shapes:
//!
//! ```text
//! Frame bytes ──decode──> Record ──merge + stamp──> Event ──publish──> Record per sink
//!                         name → Measurement        source, timestamp, fields
//! ```
//!
//! - [`Measurement`]: a value with its unit. The value is either a finite
//!   number or explicitly absent, never a silent zero.
//! - [`Record`]: an ordered mapping from measurement name to measurement. This
//!   is what filters and sinks see.
//! - [`Event`]: one completed acquisition cycle of one device.
//!
//! ## Ownership
//!
//! An event is immutable once published. The bus hands every subscriber its own
//! clone, so a reducer mutating its copy cannot affect another sink.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Name of the capture-time field inserted by the acquisition loops
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Unit of the capture-time field
pub const TIMESTAMP_UNIT: &str = "msec";

/// Measurement names understood by the plausibility check
pub mod fields {
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const PRESSURE: &str = "pressure";
    pub const PM25: &str = "pm25";
    pub const CO2: &str = "co2";
}

/// Physical unit strings produced by the decoders
pub mod units {
    pub const MICROGRAMS_PER_M3: &str = "µg/m³";
    pub const PERCENT: &str = "%";
    pub const CELSIUS: &str = "°C";
    pub const PPM: &str = "ppm";
    pub const HECTOPASCAL: &str = "hPa";
}

/// Opaque identifier of a physical interface (serial path, BLE address)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A single value with its physical unit
///
/// `value` is `None` when the sensor reported nothing usable. Construction
/// through [`Measurement::new`] maps NaN and infinities to `None` so the
/// finite-or-absent invariant holds everywhere downstream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    pub value: Option<f64>,
    pub unit: String,
}

impl Measurement {
    /// Create a measurement; non-finite values become absent
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value: value.is_finite().then_some(value),
            unit: unit.to_string(),
        }
    }

    /// Explicitly absent measurement
    pub fn absent(unit: &str) -> Self {
        Self {
            value: None,
            unit: unit.to_string(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Measurement set keyed by name, as handed to filters and sinks
pub type Record = BTreeMap<String, Measurement>;

/// One completed acquisition cycle of one device
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// Device that produced the readings
    pub source: DeviceId,
    /// Capture time, epoch milliseconds
    pub timestamp: Timestamp,
    /// Decoded measurements, including the `timestamp` field
    pub fields: Record,
}

impl Event {
    /// Build an event and mirror the capture time into the `timestamp` field
    pub fn new(source: DeviceId, timestamp: Timestamp, mut fields: Record) -> Self {
        fields.insert(
            TIMESTAMP_FIELD.to_string(),
            Measurement::new(timestamp as f64, TIMESTAMP_UNIT),
        );
        Self {
            source,
            timestamp,
            fields,
        }
    }

    /// Numeric value of a field, if present and not absent
    pub fn value(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|m| m.value)
    }

    /// Consume the event, keeping only its record
    pub fn into_record(self) -> Record {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_values_become_absent() {
        assert!(Measurement::new(f64::NAN, units::CELSIUS).is_absent());
        assert!(Measurement::new(f64::INFINITY, units::CELSIUS).is_absent());
    }

    #[test]
    fn zero_is_a_value() {
        let m = Measurement::new(0.0, units::PERCENT);
        assert_eq!(m.value, Some(0.0));
    }

    #[test]
    fn event_carries_timestamp_field() {
        let mut record = Record::new();
        record.insert(fields::TEMPERATURE.to_string(), Measurement::new(21.5, units::CELSIUS));

        let event = Event::new(DeviceId::from("/dev/ttyUSB0"), 1_700_000_000_000, record);

        assert_eq!(event.value(TIMESTAMP_FIELD), Some(1_700_000_000_000.0));
        assert_eq!(event.fields[TIMESTAMP_FIELD].unit, TIMESTAMP_UNIT);
        assert_eq!(event.value(fields::TEMPERATURE), Some(21.5));
    }
}
