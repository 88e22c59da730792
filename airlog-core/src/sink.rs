//! Sinks and the per-sink processing pipeline
//!
//! ## Overview
//!
//! A [`Sink`] persists records somewhere (a file, a broker, a test vector).
//! It is never subscribed to a bus directly. Instead each sink is wrapped in a
//! [`SinkPipeline`] that owns everything standing in front of it:
//!
//! ```text
//! Event ─> WindowReducer (optional) ─> ValidationChain ─> Sink::persist
//!              │                            │                  │
//!           held back               held or dropped     Retryable → retry once
//!                                                       Fatal     → log, drop
//! ```
//!
//! ## Failure Policy
//!
//! Sink failures stay inside the pipeline. A `Retryable` error is retried
//! exactly once, after the sink had the chance to switch to a fallback (the
//! file sink moves on to its next file index). A `Fatal` error, or a second
//! failure, is logged at error level and the record is dropped. The acquisition
//! loop never sees any of it.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::bus::EventHandler;
use crate::errors::{HandlerError, SinkError};
use crate::events::{DeviceId, Event, Record};
use crate::reducer::WindowReducer;
use crate::validators::{ValidationChain, Verdict};

/// Persistence backend
pub trait Sink: Send {
    /// Registry name of the backend, used in logs
    fn name(&self) -> &str;

    /// Store one validated record
    fn persist(&mut self, record: &Record) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        (**self).persist(record)
    }
}

/// What happened to one event inside a [`SinkPipeline`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Swallowed by a window, nothing to persist yet
    Held,
    /// Dropped by the validation chain
    Filtered,
    /// Stored on the first attempt
    Persisted,
    /// Stored on the retry
    Retried,
    /// Sink failed; record lost
    Failed(SinkError),
}

/// Counters for one pipeline
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Events received from the bus
    pub events_received: usize,
    /// Records stored by the sink
    pub records_persisted: usize,
    /// Events swallowed by a window that has not filled up yet
    pub records_held: usize,
    /// Records rejected by the validation chain
    pub records_filtered: usize,
    /// Records lost to sink failures
    pub records_failed: usize,
}

/// Reducer, validation chain and sink for one writer
pub struct SinkPipeline<S: Sink> {
    device: DeviceId,
    reducer: Option<WindowReducer>,
    chain: ValidationChain,
    sink: S,
    stats: PipelineStats,
}

impl<S: Sink> SinkPipeline<S> {
    /// Pipeline with only the plausibility check in front of `sink`
    pub fn new(device: DeviceId, sink: S) -> Self {
        Self {
            chain: ValidationChain::new(device.clone()),
            device,
            reducer: None,
            sink,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_reducer(mut self, reducer: WindowReducer) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn with_chain(mut self, chain: ValidationChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn chain(&self) -> &ValidationChain {
        &self.chain
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Push one event through reducer, chain and sink
    pub fn process(&mut self, event: Event) -> Delivery {
        self.stats.events_received += 1;

        let mut record = event.into_record();
        if let Some(reducer) = self.reducer.as_mut() {
            match reducer.push(record) {
                Some(averaged) => record = averaged,
                None => {
                    self.stats.records_held += 1;
                    return Delivery::Held;
                }
            }
        }

        let record = match self.chain.evaluate(record) {
            Verdict::Pass(record) => record,
            Verdict::Held => {
                self.stats.records_held += 1;
                return Delivery::Held;
            }
            Verdict::Rejected => {
                self.stats.records_filtered += 1;
                return Delivery::Filtered;
            }
        };

        let delivery = match self.sink.persist(&record) {
            Ok(()) => Delivery::Persisted,
            Err(e) if e.is_retryable() => {
                log::warn!("{}: {} sink: {}, retrying", self.device, self.sink.name(), e);
                match self.sink.persist(&record) {
                    Ok(()) => Delivery::Retried,
                    Err(e) => Delivery::Failed(e),
                }
            }
            Err(e) => Delivery::Failed(e),
        };

        match &delivery {
            Delivery::Failed(e) => {
                self.stats.records_failed += 1;
                log::error!("{}: {} sink dropped a record: {}", self.device, self.sink.name(), e);
            }
            _ => {
                self.stats.records_persisted += 1;
                log::debug!("{}: record stored by {} sink", self.device, self.sink.name());
            }
        }
        delivery
    }
}

impl<S: Sink> EventHandler for SinkPipeline<S> {
    fn handle(&mut self, event: Event) -> Result<(), HandlerError> {
        self.process(event);
        Ok(())
    }
}

/// Sink that keeps records in memory
///
/// Useful in tests and for wiring a pipeline before a real backend exists.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<Record>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}
