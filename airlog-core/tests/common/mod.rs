//! Common helpers for the integration tests
//!
//! - `frames`: byte-exact frame builders for every bundled sensor model
//! - [`SharedSink`]: a sink whose records stay readable after the pipeline
//!   was moved into a bus

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use airlog_core::{
    errors::SinkError,
    events::{Event, Record},
    sink::Sink,
    HandlerError,
};

pub mod frames;

/// Sink writing into a vector shared with the test
#[derive(Clone, Default)]
pub struct SharedSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Sink for SharedSink {
    fn name(&self) -> &str {
        "shared"
    }

    fn persist(&mut self, record: &Record) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Bus handler collecting raw events
pub fn event_collector() -> (Arc<Mutex<Vec<Event>>>, impl FnMut(Event) -> Result<(), HandlerError> + Send) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handler = move |event: Event| -> Result<(), HandlerError> {
        sink.lock().unwrap().push(event);
        Ok(())
    };
    (events, handler)
}
