//! Time sources for stamping events
//!
//! Acquisition loops stamp each completed cycle with a capture time taken from
//! a [`TimeSource`]. Production code uses the system clock; tests use fixed or
//! stepping clocks so timestamps are deterministic.

use core::cell::Cell;

/// Timestamp in milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Source of capture timestamps
pub trait TimeSource {
    /// Current timestamp in milliseconds
    fn now(&self) -> Timestamp;
}

/// Wall clock (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, ms: i64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Clock that moves forward by a fixed step on every read
///
/// Handy when a loop owns its clock and each event needs a distinct stamp.
#[derive(Debug)]
pub struct SteppingTime {
    next: Cell<Timestamp>,
    step_ms: i64,
}

impl SteppingTime {
    pub fn new(start: Timestamp, step_ms: i64) -> Self {
        Self {
            next: Cell::new(start),
            step_ms,
        }
    }
}

impl TimeSource for SteppingTime {
    fn now(&self) -> Timestamp {
        let current = self.next.get();
        self.next.set(current + self.step_ms);
        current
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
