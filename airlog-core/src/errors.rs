//! Error Types for the Acquisition Pipeline
//!
//! ## Error Categories
//!
//! Failures fall into four groups that are handled at different levels:
//!
//! ### Frame Problems
//! - `DecodeError::MalformedFrame`: a frame violates its model's layout. The
//!   acquisition loop logs it, drops the partial cycle and keeps streaming.
//!
//! ### Transport Problems
//! - `SourceError`: the byte or datagram source failed. Fatal to the current
//!   connection; the loop goes back to `Disconnected` and reports it.
//!
//! ### Persistence Problems
//! - `SinkError`: handled entirely by the sink pipeline (retry once or drop).
//!   Never unwinds into the acquisition loop.
//!
//! ### Setup Problems
//! - `ConfigError`: unknown model, sink or filter names and invalid parameters,
//!   detected once at startup.
//!
//! A record rejected by a filter is not an error at all; filters return `None`
//! and the chain logs the drop.
//!
//! ```rust
//! use airlog_core::decoder::{FrameDecoder, PceAqd20Decoder};
//! use airlog_core::DecodeError;
//!
//! let decoder = PceAqd20Decoder::new();
//! match decoder.decode(b"garbage") {
//!     Ok(_) => unreachable!(),
//!     Err(DecodeError::MalformedFrame { model, reason }) => {
//!         // skip the frame, keep the connection
//!         let _ = (model, reason);
//!     }
//! }
//! ```

use alloc::string::String;

use thiserror_no_std::Error;

/// Result type for frame decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Frame decoding errors - recoverable, the loop skips the frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame does not follow the layout of its sensor model
    #[error("Malformed {model} frame: {reason}")]
    MalformedFrame {
        /// Sensor model that rejected the frame
        model: &'static str,
        /// Which structural rule was violated
        reason: &'static str,
    },
}

impl DecodeError {
    pub(crate) const fn malformed(model: &'static str, reason: &'static str) -> Self {
        Self::MalformedFrame { model, reason }
    }
}

/// Transport errors - fatal to the current connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Read or write attempted while the source is closed
    #[error("Source is not open")]
    NotOpen,

    /// Underlying I/O failure (port unplugged, device gone, ...)
    #[error("I/O failure: {0}")]
    Io(String),

    /// Peer ended the stream
    #[error("Source reached end of stream")]
    EndOfStream,
}

/// Errors surfaced by the acquisition loops to their operator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// The source failed; the loop is now disconnected
    #[error("Device {device} lost its source: {error}")]
    SourceFailed {
        /// Device whose source failed
        device: String,
        /// Transport error reported by the source
        error: SourceError,
    },

    /// Stepped or subscribed-to while not connected
    #[error("Device {device} is not connected")]
    NotConnected {
        /// Device the call was made on
        device: String,
    },
}

/// Failures reported by a sink's `persist`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Worth one more attempt (the sink already switched to a fallback)
    #[error("Retryable sink failure: {0}")]
    Retryable(String),

    /// Record cannot be persisted; it will be dropped
    #[error("Fatal sink failure: {0}")]
    Fatal(String),
}

impl SinkError {
    /// Whether the pipeline should try once more
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Error returned by a bus subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Handler failed: {reason}")]
pub struct HandlerError {
    /// Human-readable cause
    pub reason: String,
}

impl HandlerError {
    /// Create a handler error from any message
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Startup configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No decoder registered under this model name
    #[error("Unknown sensor model: {0}")]
    UnknownModel(String),

    /// No sink registered under this name
    #[error("Unknown sink: {0}")]
    UnknownSink(String),

    /// No filter registered under this name
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Window size outside `1..=max`
    #[error("Window size {size} outside [1, {max}]")]
    InvalidWindow {
        /// Requested size
        size: usize,
        /// Largest supported size
        max: usize,
    },

    /// Any other invalid parameter
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
