//! Cuts a byte stream into frames
//!
//! Serial ports deliver whatever bytes have arrived, not messages. The
//! [`Framer`] buffers them and applies the decoder's [`Framing`]: a frame ends
//! at the terminator byte, after `max_len` bytes, or when a read times out with
//! data pending.

use airlog_core::decoder::{Frame, Framing};

#[derive(Debug, Clone)]
pub struct Framer {
    framing: Framing,
    pending: Vec<u8>,
}

impl Framer {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            pending: Vec::with_capacity(framing.max_len),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete frame, if the buffered bytes contain one
    pub fn next_frame(&mut self) -> Option<Frame> {
        let terminated = self
            .framing
            .terminator
            .and_then(|t| self.pending.iter().position(|&b| b == t))
            .map(|i| i + 1);

        let end = match terminated {
            Some(end) if end <= self.framing.max_len => end,
            _ if self.pending.len() >= self.framing.max_len => self.framing.max_len,
            _ => return None,
        };
        let rest = self.pending.split_off(end);
        Some(core::mem::replace(&mut self.pending, rest))
    }

    /// A read timed out: whatever is buffered forms a frame
    pub fn timed_out(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            None
        } else {
            Some(core::mem::take(&mut self.pending))
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
