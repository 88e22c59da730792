//! Tumbling Window Averages
//!
//! ## Overview
//!
//! Sensors report far more often than anyone wants to store. A
//! [`WindowReducer`] swallows N events and emits one record holding the
//! per-field average of those N samples, rounded to the nearest integer
//! (ties to even). The `timestamp` field is averaged like any other field, so
//! the output is stamped at the middle of its window.
//!
//! ## Algorithm
//!
//! ```text
//! event 1..N-1:  push value → FIFO, sum += value, smoothed = rint(sum / len)
//! event N:       timestamp FIFO full → emit smoothed, clear FIFOs
//! ```
//!
//! Each field keeps a fixed-capacity `heapless::Deque` plus a running sum, so
//! an update is O(1) and nothing allocates after the first event.
//!
//! ## Field Set
//!
//! The set of averaged fields is taken from the first event a reducer sees and
//! kept for its whole life. Fields that show up later are ignored; fields
//! missing from an event keep their previous average. An absent value is not
//! pushed and leaves that field's average absent until the next value.
//!
//! ## Example
//!
//! ```rust
//! use airlog_core::events::{Measurement, Record};
//! use airlog_core::reducer::WindowReducer;
//!
//! let mut reducer = WindowReducer::new(2).unwrap();
//! let sample = |v: f64| {
//!     let mut r = Record::new();
//!     r.insert("pm25".into(), Measurement::new(v, "µg/m³"));
//!     r
//! };
//!
//! assert!(reducer.push(sample(10.0)).is_none());
//! let out = reducer.push(sample(13.0)).unwrap();
//! assert_eq!(out["pm25"].value, Some(12.0)); // 11.5 rounds to even
//! ```

use alloc::collections::BTreeMap;
use alloc::string::String;

use heapless::Deque;

use crate::constants::buffers::MAX_WINDOW_SIZE;
use crate::errors::ConfigError;
use crate::events::{Measurement, Record, TIMESTAMP_FIELD};
use crate::validators::Filter;

/// Moving average over the last `size` samples of one field
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: Deque<f64, MAX_WINDOW_SIZE>,
    sum: f64,
    size: usize,
}

impl MovingAverage {
    /// `size` must already be validated against `MAX_WINDOW_SIZE`
    fn new(size: usize) -> Self {
        Self {
            values: Deque::new(),
            sum: 0.0,
            size,
        }
    }

    /// Add a sample and return the rounded average
    pub fn next(&mut self, value: f64) -> f64 {
        if self.values.len() >= self.size {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
        if self.values.push_back(value).is_ok() {
            self.sum += value;
        }
        libm::rint(self.sum / self.values.len() as f64)
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.size
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Per-field tumbling average over `size` events
#[derive(Debug, Clone)]
pub struct WindowReducer {
    size: usize,
    averages: Option<BTreeMap<String, MovingAverage>>,
    smoothed: Record,
    events: usize,
}

impl WindowReducer {
    /// Create a reducer averaging over `size` events
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size == 0 || size > MAX_WINDOW_SIZE {
            return Err(ConfigError::InvalidWindow {
                size,
                max: MAX_WINDOW_SIZE,
            });
        }
        Ok(Self {
            size,
            averages: None,
            smoothed: Record::new(),
            events: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Fields being averaged, empty until the first event
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.averages.iter().flat_map(|a| a.keys().map(String::as_str))
    }

    /// Feed one record; returns the averaged record when the window closes
    pub fn push(&mut self, record: Record) -> Option<Record> {
        let size = self.size;
        let averages = self.averages.get_or_insert_with(|| {
            log::debug!("window reducer tracking {} fields over {} events", record.len(), size);
            record
                .keys()
                .map(|name| (name.clone(), MovingAverage::new(size)))
                .collect()
        });

        for (name, measurement) in record {
            let Some(average) = averages.get_mut(&name) else {
                continue;
            };
            let value = measurement.value.map(|v| average.next(v));
            self.smoothed.insert(
                name,
                Measurement {
                    value,
                    unit: measurement.unit,
                },
            );
        }
        self.events += 1;

        let full = match averages.get(TIMESTAMP_FIELD) {
            Some(timestamps) => timestamps.is_full(),
            None => self.events >= self.size,
        };
        if !full {
            return None;
        }

        for average in averages.values_mut() {
            average.clear();
        }
        self.events = 0;
        Some(core::mem::take(&mut self.smoothed))
    }
}

impl Filter for WindowReducer {
    fn name(&self) -> &'static str {
        "window"
    }

    fn process(&mut self, record: Record) -> Option<Record> {
        self.push(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use proptest::prelude::*;

    fn sample(timestamp: i64, pm25: Option<f64>) -> Record {
        let mut record = Record::new();
        record.insert(TIMESTAMP_FIELD.to_string(), Measurement::new(timestamp as f64, "msec"));
        record.insert(
            "pm25".to_string(),
            Measurement {
                value: pm25,
                unit: "µg/m³".to_string(),
            },
        );
        record
    }

    #[test]
    fn rejects_invalid_sizes() {
        assert!(WindowReducer::new(0).is_err());
        assert!(WindowReducer::new(MAX_WINDOW_SIZE + 1).is_err());
        assert!(WindowReducer::new(MAX_WINDOW_SIZE).is_ok());
    }

    #[test]
    fn flushes_once_per_window() {
        let mut reducer = WindowReducer::new(3).unwrap();

        assert!(reducer.push(sample(1000, Some(10.0))).is_none());
        assert!(reducer.push(sample(2000, Some(11.0))).is_none());
        let out = reducer.push(sample(3000, Some(15.0))).unwrap();

        assert_eq!(out[TIMESTAMP_FIELD].value, Some(2000.0));
        assert_eq!(out["pm25"].value, Some(12.0));
        assert_eq!(out["pm25"].unit, "µg/m³");

        assert!(reducer.push(sample(4000, Some(1.0))).is_none());
    }

    #[test]
    fn zero_is_averaged() {
        let mut reducer = WindowReducer::new(2).unwrap();
        reducer.push(sample(0, Some(0.0)));
        let out = reducer.push(sample(2, Some(4.0))).unwrap();
        assert_eq!(out["pm25"].value, Some(2.0));
    }

    #[test]
    fn absent_value_is_not_pushed() {
        let mut reducer = WindowReducer::new(2).unwrap();
        reducer.push(sample(0, Some(8.0)));
        let out = reducer.push(sample(2, None)).unwrap();
        assert_eq!(out["pm25"].value, None);

        reducer.push(sample(4, None));
        let out = reducer.push(sample(6, Some(3.0))).unwrap();
        assert_eq!(out["pm25"].value, Some(3.0));
    }

    #[test]
    fn late_fields_are_ignored() {
        let mut reducer = WindowReducer::new(2).unwrap();
        reducer.push(sample(0, Some(1.0)));

        let mut late = sample(2, Some(1.0));
        late.insert("co2".to_string(), Measurement::new(400.0, "ppm"));
        let out = reducer.push(late).unwrap();

        assert!(!out.contains_key("co2"));
        assert_eq!(reducer.fields().count(), 2);
    }

    #[test]
    fn counts_events_without_timestamp() {
        let mut reducer = WindowReducer::new(2).unwrap();
        let mut record = Record::new();
        record.insert("humidity".to_string(), Measurement::new(40.0, "%"));

        assert!(reducer.push(record.clone()).is_none());
        assert!(reducer.push(record).is_some());
    }

    #[test]
    fn moving_average_evicts_oldest() {
        let mut average = MovingAverage::new(2);
        assert_eq!(average.next(2.0), 2.0);
        assert_eq!(average.next(4.0), 3.0);
        assert_eq!(average.next(10.0), 7.0);
        assert_eq!(average.len(), 2);
        assert!(average.is_full());
    }

    proptest! {
        #[test]
        fn constant_input_flushes_its_rounding(size in 1usize..=40, quarters in -4000i32..4000) {
            // quarter steps keep the running sum exact, ties included
            let c = f64::from(quarters) / 4.0;
            let mut reducer = WindowReducer::new(size).unwrap();
            let mut flushed = Vec::new();
            for i in 0..size {
                if let Some(out) = reducer.push(sample(i as i64, Some(c))) {
                    flushed.push(out);
                }
            }
            prop_assert_eq!(flushed.len(), 1);
            prop_assert_eq!(flushed[0]["pm25"].value, Some(libm::rint(c)));
        }

        #[test]
        fn short_windows_flush_nothing(size in 2usize..=40, c in -1000.0f64..1000.0) {
            let mut reducer = WindowReducer::new(size).unwrap();
            for i in 0..size - 1 {
                prop_assert!(reducer.push(sample(i as i64, Some(c))).is_none());
            }
        }
    }
}
