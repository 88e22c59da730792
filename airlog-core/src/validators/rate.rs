//! Rate-of-change limit for one field
//!
//! Compares each record against the last record this filter let through and
//! rejects it when the field moved faster than `max_rate_per_s`. The first
//! record always passes. Rejected records do not become the new reference, so
//! a single spike cannot drag the baseline along with it.

use alloc::string::{String, ToString};

use crate::events::{Record, TIMESTAMP_FIELD};

use super::utils::{calculate_rate_from_reading, TimestampedReading};
use super::{Filter, Rejection};

#[derive(Debug, Clone)]
pub struct RateFilter {
    field: String,
    max_rate_per_s: f64,
    last: Option<TimestampedReading>,
    rejection: Option<Rejection>,
}

impl RateFilter {
    pub fn new(field: impl Into<String>, max_rate_per_s: f64) -> Self {
        Self {
            field: field.into(),
            max_rate_per_s,
            last: None,
            rejection: None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn reject(&mut self, value: Option<f64>) -> Option<Record> {
        self.rejection = Some(Rejection {
            field: self.field.to_string(),
            value,
        });
        None
    }
}

impl Filter for RateFilter {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn process(&mut self, record: Record) -> Option<Record> {
        let Some(value) = record.get(&self.field).and_then(|m| m.value) else {
            return self.reject(None);
        };
        // missing timestamps compare as simultaneous, which never exceeds the limit
        let timestamp = record
            .get(TIMESTAMP_FIELD)
            .and_then(|m| m.value)
            .map_or(self.last.map_or(0, |last| last.timestamp), |t| t as i64);

        if let Some(last) = self.last {
            let rate = calculate_rate_from_reading(value, timestamp, &last);
            if rate > self.max_rate_per_s {
                log::debug!("{} changed at {:.3}/s, limit {:.3}/s", self.field, rate, self.max_rate_per_s);
                return self.reject(Some(value));
            }
        }

        self.last = Some(TimestampedReading { value, timestamp });
        self.rejection = None;
        Some(record)
    }

    fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }
}
