//! Frame Decoders
//!
//! ## Overview
//!
//! A decoder turns one raw frame (a line, a JSON blob, a notification
//! payload) into a partial [`Record`]. Decoders are pure: they hold only their
//! configuration and never mutate state while decoding, so the acquisition
//! loop can call [`FrameDecoder::is_frame_start`] as often as it likes while
//! resynchronizing.
//!
//! ## Supported Models
//!
//! | Model | Transport | Frame | Frames per event |
//! |-------|-----------|-------|------------------|
//! | [`PceAqd20Decoder`] | serial | 16-byte fixed-width ASCII | 5 |
//! | [`PlantowerDecoder`] | serial | noisy buffer with a JSON object | 1 |
//! | [`XiaomiMiDecoder`] | BLE notify | 3-byte binary | 1 |
//!
//! ## Framing
//!
//! Serial transports need to know where one frame ends. Each decoder reports
//! a [`Framing`]: a terminator byte and a maximum length. A model without a
//! terminator relies on the transport's read timeout to delimit frames.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::errors::DecodeResult;
use crate::events::Record;

mod pce_aqd20;
mod plantower;
mod xiaomi;

pub use pce_aqd20::PceAqd20Decoder;
pub use plantower::PlantowerDecoder;
pub use xiaomi::{SignCorrection, XiaomiMiDecoder};

/// One raw unit of data read from a device
pub type Frame = Vec<u8>;

/// How a stream transport cuts the byte stream into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Byte that ends a frame (kept in the frame)
    pub terminator: Option<u8>,
    /// Frame is complete once this many bytes were read
    pub max_len: usize,
}

impl Framing {
    /// Frames end with a timed-out read
    pub const fn timeout_delimited(max_len: usize) -> Self {
        Self {
            terminator: None,
            max_len,
        }
    }

    /// Frames end with `terminator` or after `max_len` bytes
    pub const fn terminated(terminator: u8, max_len: usize) -> Self {
        Self {
            terminator: Some(terminator),
            max_len,
        }
    }
}

/// Per-model frame decoder
pub trait FrameDecoder: Send {
    /// Registry name of the sensor model
    fn model(&self) -> &'static str;

    /// Whether `frame` can open a dataset; used to (re)synchronize
    fn is_frame_start(&self, frame: &[u8]) -> bool;

    /// Decode one frame into named measurements
    fn decode(&self, frame: &[u8]) -> DecodeResult<Record>;

    /// Number of consecutive frames that make up one event
    fn frames_per_event(&self) -> usize {
        1
    }

    /// Framing rule for stream transports
    fn framing(&self) -> Framing {
        Framing::timeout_delimited(crate::constants::buffers::MAX_FRAME_LEN)
    }

    /// Serial read timeout that separates two messages
    fn read_timeout_ms(&self) -> u64 {
        crate::constants::time::DEFAULT_READ_TIMEOUT_MS
    }

    /// Bytes to write after connecting before the sensor starts streaming
    fn activation_command(&self) -> Option<&'static [u8]> {
        None
    }

    /// Bytes to write before disconnecting
    fn deactivation_command(&self) -> Option<&'static [u8]> {
        None
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn model(&self) -> &'static str {
        (**self).model()
    }

    fn is_frame_start(&self, frame: &[u8]) -> bool {
        (**self).is_frame_start(frame)
    }

    fn decode(&self, frame: &[u8]) -> DecodeResult<Record> {
        (**self).decode(frame)
    }

    fn frames_per_event(&self) -> usize {
        (**self).frames_per_event()
    }

    fn framing(&self) -> Framing {
        (**self).framing()
    }

    fn read_timeout_ms(&self) -> u64 {
        (**self).read_timeout_ms()
    }

    fn activation_command(&self) -> Option<&'static [u8]> {
        (**self).activation_command()
    }

    fn deactivation_command(&self) -> Option<&'static [u8]> {
        (**self).deactivation_command()
    }
}
