//! Physical plausibility of every field in a record
//!
//! ```text
//! temperature   [-30, 80]    °C
//! pressure      [800, 1200]  hPa
//! humidity      [0, 100]     %
//! anything else [0, ∞)
//! ```
//!
//! One implausible or absent value discards the whole record.

use alloc::string::ToString;

use crate::constants::sensors::{
    GENERIC_PLAUSIBLE_MIN, HUMIDITY_PLAUSIBLE_MAX_PCT, HUMIDITY_PLAUSIBLE_MIN_PCT, PRESSURE_PLAUSIBLE_MAX_HPA,
    PRESSURE_PLAUSIBLE_MIN_HPA, TEMP_PLAUSIBLE_MAX_C, TEMP_PLAUSIBLE_MIN_C,
};
use crate::events::{fields, Record};

use super::utils::check_range;
use super::{Filter, Rejection};

/// Bounds applied to a field name
pub fn plausible_range(field: &str) -> (Option<f64>, Option<f64>) {
    match field {
        fields::TEMPERATURE => (Some(TEMP_PLAUSIBLE_MIN_C), Some(TEMP_PLAUSIBLE_MAX_C)),
        fields::PRESSURE => (Some(PRESSURE_PLAUSIBLE_MIN_HPA), Some(PRESSURE_PLAUSIBLE_MAX_HPA)),
        fields::HUMIDITY => (Some(HUMIDITY_PLAUSIBLE_MIN_PCT), Some(HUMIDITY_PLAUSIBLE_MAX_PCT)),
        _ => (Some(GENERIC_PLAUSIBLE_MIN), None),
    }
}

/// Filter that always runs first in a [`super::ValidationChain`]
#[derive(Debug, Clone, Default)]
pub struct PlausibilityCheck {
    rejection: Option<Rejection>,
}

impl PlausibilityCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// First implausible field of `record`, if any
    pub fn check(record: &Record) -> Result<(), Rejection> {
        for (name, measurement) in record {
            let (min, max) = plausible_range(name);
            if !check_range(measurement.value, min, max) {
                return Err(Rejection {
                    field: name.to_string(),
                    value: measurement.value,
                });
            }
        }
        Ok(())
    }
}

impl Filter for PlausibilityCheck {
    fn name(&self) -> &'static str {
        "plausibility"
    }

    fn process(&mut self, record: Record) -> Option<Record> {
        self.rejection = Self::check(&record).err();
        self.rejection.is_none().then_some(record)
    }

    fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{units, Measurement};

    fn record(entries: &[(&str, Option<f64>)]) -> Record {
        entries
            .iter()
            .map(|&(name, value)| {
                let m = match value {
                    Some(v) => Measurement::new(v, units::PERCENT),
                    None => Measurement::absent(units::PERCENT),
                };
                (name.to_string(), m)
            })
            .collect()
    }

    #[test]
    fn accepts_boundaries() {
        let ok = record(&[
            (fields::TEMPERATURE, Some(-30.0)),
            (fields::PRESSURE, Some(1200.0)),
            (fields::HUMIDITY, Some(0.0)),
            (fields::PM25, Some(0.0)),
        ]);
        assert!(PlausibilityCheck::check(&ok).is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let cases = [
            (fields::TEMPERATURE, 80.5),
            (fields::PRESSURE, 799.0),
            (fields::HUMIDITY, 150.0),
            (fields::CO2, -1.0),
        ];
        for (field, value) in cases {
            let err = PlausibilityCheck::check(&record(&[(field, Some(value))])).unwrap_err();
            assert_eq!(err.field, field);
            assert_eq!(err.value, Some(value));
        }
    }

    #[test]
    fn absent_value_fails() {
        let mut check = PlausibilityCheck::new();
        assert!(check.process(record(&[(fields::PM25, None)])).is_none());
        assert_eq!(check.rejection().map(|r| r.value), Some(None));
    }

    #[test]
    fn rejection_clears_on_pass() {
        let mut check = PlausibilityCheck::new();
        check.process(record(&[(fields::HUMIDITY, Some(101.0))]));
        assert!(check.rejection().is_some());

        assert!(check.process(record(&[(fields::HUMIDITY, Some(50.0))])).is_some());
        assert!(check.rejection().is_none());
    }
}
