//! Acquisition-and-dispatch core for airlog
//!
//! Turns raw sensor bytes into typed, validated records and hands them to
//! persistence sinks. Hardware access and concrete storage live in
//! `airlog-connectors`; this crate only sees them through the
//! [`source::FrameSource`], [`source::NotificationSource`] and [`sink::Sink`]
//! traits.
//!
//! ```text
//! FrameSource ─> AcquisitionLoop ─> FrameDecoder ─> Event ─> EventBus
//!                                                              │
//!                           ┌──────────────────────────────────┤ one per writer
//!                           v                                  v
//!                      SinkPipeline                       SinkPipeline
//!             WindowReducer → ValidationChain → Sink         ...
//! ```
//!
//! Key constraints:
//! - Decode and validation failures never stop a device; only a source failure
//!   changes the loop state
//! - One loop, one bus and one set of sink pipelines per device
//! - Runs without `std` (with `alloc`); window buffers are fixed-capacity
//!
//! ```
//! use airlog_core::acquisition::{AcquisitionLoop, StepOutcome};
//! use airlog_core::decoder::XiaomiMiDecoder;
//! use airlog_core::events::DeviceId;
//! use airlog_core::sink::{MemorySink, SinkPipeline};
//! use airlog_core::source::MemorySource;
//! use airlog_core::time::FixedTime;
//!
//! let device = DeviceId::from("A4:C1:38:00:00:01");
//! let source = MemorySource::new().frame(&[0x66, 0x08, 45]);
//! let mut acq = AcquisitionLoop::new(device.clone(), source, XiaomiMiDecoder::new(), FixedTime::new(1_000));
//! acq.bus_mut().subscribe(SinkPipeline::new(device, MemorySink::new()));
//!
//! acq.connect().unwrap();
//! assert_eq!(acq.step().unwrap(), StepOutcome::Published);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod acquisition;
pub mod bus;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod reducer;
pub mod registry;
pub mod sink;
pub mod source;
pub mod time;
pub mod validators;

// Public API
pub use acquisition::{AcquisitionLoop, LoopState, NotificationLoop, StepOutcome};
pub use bus::{EventBus, EventHandler, SubscriptionHandle};
pub use decoder::{Frame, FrameDecoder, Framing};
pub use errors::{AcquisitionError, ConfigError, DecodeError, DecodeResult, HandlerError, SinkError, SourceError};
pub use events::{DeviceId, Event, Measurement, Record};
pub use reducer::WindowReducer;
pub use registry::{ModelOptions, ModelRegistry};
pub use sink::{Delivery, Sink, SinkPipeline};
pub use source::{FrameSource, NotificationSource};
pub use time::{TimeSource, Timestamp};
pub use validators::{Filter, ValidationChain, ValidationRule, Verdict};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
