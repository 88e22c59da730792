//! Scripted in-memory source for testing and replay
//!
//! A [`MemorySource`] plays back a fixed script of reads. Each entry is a
//! frame, an idle read or a transport failure, so tests can drive the
//! acquisition loop through every state transition without hardware. Once the
//! script runs out every read is idle.
//!
//! ```rust
//! use airlog_core::source::{FrameSource, MemorySource};
//! use airlog_core::SourceError;
//!
//! let mut source = MemorySource::new()
//!     .frame(b"line 1\r")
//!     .idle()
//!     .fail(SourceError::EndOfStream);
//!
//! source.open().unwrap();
//! assert_eq!(source.read_frame().unwrap(), b"line 1\r".to_vec());
//! assert!(matches!(source.read_frame(), Err(nb::Error::WouldBlock)));
//! assert!(matches!(source.read_frame(), Err(nb::Error::Other(SourceError::EndOfStream))));
//! ```

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::decoder::Frame;
use crate::errors::SourceError;

use super::{FrameSource, NotificationSource};

/// One scripted read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Deliver this frame
    Frame(Frame),
    /// Time out without data
    Idle,
    /// Fail with a transport error
    Fail(SourceError),
}

/// In-memory [`FrameSource`] and [`NotificationSource`]
#[derive(Debug, Default)]
pub struct MemorySource {
    script: VecDeque<Scripted>,
    open: bool,
    notifying: bool,
    opened: usize,
    written: Vec<Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that delivers `frames` in order
    pub fn from_frames<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Frame>,
    {
        Self {
            script: frames.into_iter().map(|f| Scripted::Frame(f.into())).collect(),
            ..Self::default()
        }
    }

    pub fn frame(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Scripted::Frame(bytes.to_vec()));
        self
    }

    pub fn idle(mut self) -> Self {
        self.script.push_back(Scripted::Idle);
        self
    }

    pub fn fail(mut self, error: SourceError) -> Self {
        self.script.push_back(Scripted::Fail(error));
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// How many times the source was opened
    pub fn open_count(&self) -> usize {
        self.opened
    }

    /// Commands written to the device, oldest first
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Scripted reads not consumed yet
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameSource for MemorySource {
    fn open(&mut self) -> Result<(), SourceError> {
        self.open = true;
        self.opened += 1;
        Ok(())
    }

    fn read_frame(&mut self) -> nb::Result<Frame, SourceError> {
        if !self.open {
            return Err(nb::Error::Other(SourceError::NotOpen));
        }
        match self.script.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(frame),
            Some(Scripted::Idle) | None => Err(nb::Error::WouldBlock),
            Some(Scripted::Fail(error)) => Err(nb::Error::Other(error)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

impl NotificationSource for MemorySource {
    fn start_notify(&mut self) -> Result<(), SourceError> {
        self.notifying = true;
        Ok(())
    }

    fn stop_notify(&mut self) -> Result<(), SourceError> {
        self.notifying = false;
        Ok(())
    }
}
