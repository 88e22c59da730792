//! Record Filters and the Validation Chain
//!
//! ## Overview
//!
//! Before a record reaches a sink it passes an ordered list of [`Filter`]s.
//! A filter either hands the record on (possibly modified) or returns `None`
//! to drop it. The first `None` ends the chain; later filters never see the
//! record.
//!
//! ```text
//! Record ─> PlausibilityCheck ─> filter 2 ─> ... ─> filter n ─> Sink
//!                 │                  │                  │
//!                None               None               None   (dropped, logged)
//! ```
//!
//! ## Filters
//!
//! | Filter | Config name | Drops a record when |
//! |--------|-------------|---------------------|
//! | [`PlausibilityCheck`] | always first | any field is absent or physically implausible |
//! | [`RuleFilter`] | `rule` | a configured field is outside its bounds |
//! | [`RateFilter`] | `rate` | a field moved faster than its per-second limit |
//! | [`crate::reducer::WindowReducer`] | `window` | the window is not full yet (not a rejection) |
//!
//! ## Rejections vs. Holding Back
//!
//! A filter that drops a record because it is wrong reports a [`Rejection`]
//! (field and value) and the chain logs it at warn level. A filter that only
//! holds a record back, like a window waiting to fill up, reports nothing and
//! the chain logs at debug level.
//!
//! ## Example
//!
//! ```rust
//! use airlog_core::events::{DeviceId, Measurement, Record};
//! use airlog_core::validators::{RuleFilter, ValidationChain, ValidationRule};
//!
//! let mut chain = ValidationChain::new(DeviceId::from("/dev/ttyUSB0"))
//!     .with_filter(RuleFilter::new(vec![ValidationRule::new("co2", None, Some(5000.0))]));
//!
//! let mut record = Record::new();
//! record.insert("co2".into(), Measurement::new(412.0, "ppm"));
//! assert!(chain.process(record.clone()).is_some());
//!
//! record.insert("humidity".into(), Measurement::new(150.0, "%"));
//! assert!(chain.process(record).is_none());
//! ```

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::events::{DeviceId, Record};

pub mod plausibility;
pub mod rate;
pub mod utils;

pub use plausibility::PlausibilityCheck;
pub use rate::RateFilter;

/// Why a filter dropped a record
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Field that failed
    pub field: String,
    /// Its value, `None` when missing or absent
    pub value: Option<f64>,
}

/// One stage of a [`ValidationChain`]
pub trait Filter: Send {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    /// Pass the record on, or `None` to drop it
    fn process(&mut self, record: Record) -> Option<Record>;

    /// Why the last `process` call dropped its record, if it was a rejection
    fn rejection(&self) -> Option<&Rejection> {
        None
    }
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process(&mut self, record: Record) -> Option<Record> {
        (**self).process(record)
    }

    fn rejection(&self) -> Option<&Rejection> {
        (**self).rejection()
    }
}

/// Bounds for one field; `None` leaves that side open
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValidationRule {
    pub field: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub min: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub max: Option<f64>,
}

impl ValidationRule {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }

    /// Missing or absent fields fail
    pub fn check(&self, record: &Record) -> Result<(), Rejection> {
        let value = record.get(&self.field).and_then(|m| m.value);
        if utils::check_range(value, self.min, self.max) {
            Ok(())
        } else {
            Err(Rejection {
                field: self.field.to_string(),
                value,
            })
        }
    }
}

/// Applies a list of [`ValidationRule`]s; all must hold
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    rules: Vec<ValidationRule>,
    rejection: Option<Rejection>,
}

impl RuleFilter {
    pub fn new(rules: Vec<ValidationRule>) -> Self {
        Self { rules, rejection: None }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }
}

impl Filter for RuleFilter {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn process(&mut self, record: Record) -> Option<Record> {
        self.rejection = self.rules.iter().find_map(|rule| rule.check(&record).err());
        self.rejection.is_none().then_some(record)
    }

    fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }
}

/// Result of running a record through a [`ValidationChain`]
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Every filter passed the record on
    Pass(Record),
    /// A filter dropped the record as wrong
    Rejected,
    /// A filter kept the record back, e.g. a window still filling up
    Held,
}

impl Verdict {
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Pass(record) => Some(record),
            _ => None,
        }
    }
}

/// Ordered filters in front of one sink, starting with [`PlausibilityCheck`]
pub struct ValidationChain {
    device: DeviceId,
    filters: Vec<Box<dyn Filter>>,
}

impl ValidationChain {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            filters: alloc::vec![Box::new(PlausibilityCheck::new()) as Box<dyn Filter>],
        }
    }

    pub fn with_filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Filter names in execution order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.iter().map(|f| f.name())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run `record` through every filter, stopping at the first drop
    pub fn process(&mut self, record: Record) -> Option<Record> {
        self.evaluate(record).into_record()
    }

    /// Like [`process`](Self::process), telling rejections from held records
    pub fn evaluate(&mut self, record: Record) -> Verdict {
        let mut record = record;
        for filter in self.filters.iter_mut() {
            record = match filter.process(record) {
                Some(record) => record,
                None => {
                    return match filter.rejection() {
                        Some(r) => {
                            log::warn!(
                                "{}: record dropped by {} filter, {} = {:?}",
                                self.device,
                                filter.name(),
                                r.field,
                                r.value
                            );
                            Verdict::Rejected
                        }
                        None => {
                            log::debug!("{}: record held by {} filter", self.device, filter.name());
                            Verdict::Held
                        }
                    };
                }
            };
        }
        Verdict::Pass(record)
    }
}

impl core::fmt::Debug for ValidationChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ValidationChain")
            .field("device", &self.device)
            .field("filters", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
