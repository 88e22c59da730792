//! Per-device publish/subscribe fan-out
//!
//! Every device gets exactly one [`EventBus`]. Its acquisition loop publishes
//! completed events on it; sink pipelines subscribe to it at startup.
//!
//! ## Delivery Rules
//!
//! - Handlers run synchronously on the publisher's thread, in the order they
//!   subscribed.
//! - Each handler receives its own clone of the event and may consume or mutate
//!   it freely.
//! - A handler returning an error is logged; the remaining handlers still run.
//!   With the `std` feature a panicking handler is caught and treated the same
//!   way; it stays subscribed.
//! - There is no unsubscribe. A bus lives as long as its device.
//!
//! ```rust
//! use airlog_core::bus::EventBus;
//! use airlog_core::HandlerError;
//! use airlog_core::events::{DeviceId, Event, Record};
//!
//! let mut bus = EventBus::new(DeviceId::from("/dev/ttyUSB0"));
//! let handle = bus.subscribe(|event: Event| -> Result<(), HandlerError> {
//!     assert!(event.value("timestamp").is_some());
//!     Ok(())
//! });
//!
//! let delivered = bus.publish(&Event::new(DeviceId::from("/dev/ttyUSB0"), 1000, Record::new()));
//! assert_eq!(delivered, 1);
//! assert_eq!(handle.id(), 0);
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::errors::HandlerError;
use crate::events::{DeviceId, Event};

/// Subscriber callback
pub trait EventHandler: Send {
    /// Handle one published event
    fn handle(&mut self, event: Event) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: FnMut(Event) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, event: Event) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Receipt for a subscription, identifying the handler in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: usize,
}

impl SubscriptionHandle {
    /// Position of the handler in delivery order
    pub fn id(&self) -> usize {
        self.id
    }
}

/// In-process event bus for one device
pub struct EventBus {
    device: DeviceId,
    handlers: Vec<Box<dyn EventHandler>>,
}

impl EventBus {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            handlers: Vec::new(),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Register a handler; it sees every event published from now on
    pub fn subscribe<H>(&mut self, handler: H) -> SubscriptionHandle
    where
        H: EventHandler + 'static,
    {
        let handle = SubscriptionHandle {
            id: self.handlers.len(),
        };
        self.handlers.push(Box::new(handler));
        log::debug!("{}: subscriber {} registered", self.device, handle.id);
        handle
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `event` to every subscriber, returning how many succeeded
    pub fn publish(&mut self, event: &Event) -> usize {
        let mut delivered = 0;
        for (id, handler) in self.handlers.iter_mut().enumerate() {
            match call(handler.as_mut(), event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("{}: subscriber {} failed: {}", self.device, id, e),
            }
        }
        delivered
    }
}

#[cfg(feature = "std")]
fn call(handler: &mut dyn EventHandler, event: Event) -> Result<(), HandlerError> {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    catch_unwind(AssertUnwindSafe(|| handler.handle(event))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<alloc::string::String>().cloned())
            .unwrap_or_else(|| "unknown cause".into());
        Err(HandlerError::new(alloc::format!("panicked: {}", reason)))
    })
}

#[cfg(not(feature = "std"))]
fn call(handler: &mut dyn EventHandler, event: Event) -> Result<(), HandlerError> {
    handler.handle(event)
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("device", &self.device)
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Measurement, Record};
    use alloc::string::ToString;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn event(value: f64) -> Event {
        let mut record = Record::new();
        record.insert("pm25".to_string(), Measurement::new(value, "µg/m³"));
        Event::new(DeviceId::from("dev"), 1000, record)
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new(DeviceId::from("dev"));

        for n in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(move |_event: Event| -> Result<(), HandlerError> {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }

        assert_eq!(bus.publish(&event(1.0)), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_handler_does_not_stop_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new(DeviceId::from("dev"));

        bus.subscribe(|_event: Event| -> Result<(), HandlerError> { Err(HandlerError::new("sink offline")) });
        let counter = Arc::clone(&calls);
        bus.subscribe(move |_event: Event| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(&event(1.0)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new(DeviceId::from("dev"));

        bus.subscribe(|_event: Event| -> Result<(), HandlerError> { panic!("sink exploded") });
        let counter = Arc::clone(&calls);
        bus.subscribe(move |_event: Event| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(&event(1.0)), 1);
        assert_eq!(bus.publish(&event(2.0)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn each_handler_gets_its_own_copy() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new(DeviceId::from("dev"));

        bus.subscribe(|mut event: Event| -> Result<(), HandlerError> {
            event.fields.clear();
            Ok(())
        });
        let sink = Arc::clone(&seen);
        bus.subscribe(move |event: Event| -> Result<(), HandlerError> {
            sink.lock().unwrap().push(event.value("pm25"));
            Ok(())
        });

        bus.publish(&event(12.0));
        assert_eq!(*seen.lock().unwrap(), vec![Some(12.0)]);
    }

    #[test]
    fn handles_count_up() {
        let mut bus = EventBus::new(DeviceId::from("dev"));
        let first = bus.subscribe(|_event: Event| -> Result<(), HandlerError> { Ok(()) });
        let second = bus.subscribe(|_event: Event| -> Result<(), HandlerError> { Ok(()) });
        assert_eq!((first.id(), second.id()), (0, 1));
        assert_eq!(bus.subscriber_count(), 2);
    }
}
