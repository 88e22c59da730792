//! Frame Sources
//!
//! ## Overview
//!
//! The acquisition loops never talk to hardware directly. They go through one
//! of two seams:
//!
//! - [`FrameSource`]: a poll source. The loop asks for the next frame; the
//!   source cuts it out of its byte stream (terminator, length or read
//!   timeout) and hands it over. An empty read is `nb::Error::WouldBlock`.
//! - [`NotificationSource`]: a push source (BLE GATT notifications). The
//!   transport calls [`crate::acquisition::NotificationLoop::on_notification`]
//!   on its own delivery context; the loop only starts and stops the flow.
//!
//! ## Error Semantics
//!
//! Every `SourceError` is fatal to the current connection. The loop closes the
//! source, returns to `Disconnected` and reports the error; whether to
//! reconnect is up to the caller.
//!
//! ```text
//! read_frame() ──Ok(frame)──────────> decode
//!              ──WouldBlock─────────> idle step
//!              ──Other(SourceError)─> close + Disconnected
//! ```

use alloc::boxed::Box;

use crate::decoder::Frame;
use crate::errors::SourceError;

pub mod memory;

pub use memory::{MemorySource, Scripted};

/// Poll-style byte source delivering one frame per read
pub trait FrameSource: Send {
    /// Open the underlying transport
    fn open(&mut self) -> Result<(), SourceError>;

    /// Discard anything buffered before the loop starts synchronizing
    fn flush_input(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Read the next frame
    ///
    /// Returns `WouldBlock` when the read timed out without data.
    fn read_frame(&mut self) -> nb::Result<Frame, SourceError>;

    /// Write a command to the device
    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError>;

    /// Release the transport; closing a closed source is a no-op
    fn close(&mut self);
}

/// Push-style source that delivers frames through a callback
pub trait NotificationSource: Send {
    /// Ask the device to start sending notifications
    fn start_notify(&mut self) -> Result<(), SourceError>;

    /// Ask the device to stop sending notifications
    fn stop_notify(&mut self) -> Result<(), SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn flush_input(&mut self) -> Result<(), SourceError> {
        (**self).flush_input()
    }

    fn read_frame(&mut self) -> nb::Result<Frame, SourceError> {
        (**self).read_frame()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: NotificationSource + ?Sized> NotificationSource for Box<S> {
    fn start_notify(&mut self) -> Result<(), SourceError> {
        (**self).start_notify()
    }

    fn stop_notify(&mut self) -> Result<(), SourceError> {
        (**self).stop_notify()
    }
}

impl<S: NotificationSource + ?Sized> NotificationSource for &mut S {
    fn start_notify(&mut self) -> Result<(), SourceError> {
        (**self).start_notify()
    }

    fn stop_notify(&mut self) -> Result<(), SourceError> {
        (**self).stop_notify()
    }
}
