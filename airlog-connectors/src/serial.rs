//! Serial port transport
//!
//! Wraps a `serialport` handle as a [`FrameSource`]. Reads block for at most
//! the configured timeout; a timed-out read with bytes pending completes a
//! frame, a timed-out read without bytes is reported as `WouldBlock`.

use std::io::{self, Read, Write};
use std::time::Duration;

use airlog_core::decoder::{Frame, FrameDecoder, Framing};
use airlog_core::errors::SourceError;
use airlog_core::source::FrameSource;
use serialport::{ClearBuffer, SerialPort};

use crate::framer::Framer;

/// Default line speed when the reader configuration names none
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const READ_CHUNK: usize = 256;

pub struct SerialSource {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    framer: Framer,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialSource {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration, framing: Framing) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
            framer: Framer::new(framing),
            port: None,
        }
    }

    /// Source using the decoder's framing and read timeout
    pub fn for_decoder(path: impl Into<String>, baud_rate: u32, decoder: &dyn FrameDecoder) -> Self {
        Self::new(
            path,
            baud_rate,
            Duration::from_millis(decoder.read_timeout_ms()),
            decoder.framing(),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn io_error(&self, error: impl std::fmt::Display) -> SourceError {
        SourceError::Io(format!("{}: {}", self.path, error))
    }
}

impl FrameSource for SerialSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| self.io_error(e))?;
        log::info!("Opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        self.framer.clear();
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), SourceError> {
        self.framer.clear();
        match self.port.as_mut() {
            Some(port) => port.clear(ClearBuffer::Input).map_err(|e| SourceError::Io(e.to_string())),
            None => Err(SourceError::NotOpen),
        }
    }

    fn read_frame(&mut self) -> nb::Result<Frame, SourceError> {
        if let Some(frame) = self.framer.next_frame() {
            return Ok(frame);
        }

        let port = self.port.as_mut().ok_or(nb::Error::Other(SourceError::NotOpen))?;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.framer.extend(&chunk[..n]);
                    if let Some(frame) = self.framer.next_frame() {
                        return Ok(frame);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let error = SourceError::Io(format!("{}: {}", self.path, e));
                    return Err(nb::Error::Other(error));
                }
            }
        }

        self.framer.timed_out().ok_or(nb::Error::WouldBlock)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        let port = self.port.as_mut().ok_or(SourceError::NotOpen)?;
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(|e| SourceError::Io(e.to_string()))?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), self.path);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed {}", self.path);
        }
        self.framer.clear();
    }
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("timeout", &self.timeout)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlog_core::decoder::{PceAqd20Decoder, PlantowerDecoder};

    #[test]
    fn decoder_sets_timeout_and_framing() {
        let pce = SerialSource::for_decoder("/dev/ttyUSB0", 9600, &PceAqd20Decoder::new());
        assert_eq!(pce.timeout(), Duration::from_millis(500));
        assert_eq!(pce.framer.framing().terminator, Some(b'\r'));

        let plantower = SerialSource::for_decoder("/dev/ttyUSB1", DEFAULT_BAUD_RATE, &PlantowerDecoder::new());
        assert_eq!(plantower.timeout(), Duration::from_millis(100));
        assert_eq!(plantower.framer.framing().terminator, None);
    }

    #[test]
    fn closed_port_refuses_io() {
        let mut source = SerialSource::for_decoder("/dev/null-port", 9600, &PceAqd20Decoder::new());
        assert!(!source.is_open());
        assert_eq!(source.read_frame(), Err(nb::Error::Other(SourceError::NotOpen)));
        assert_eq!(source.write(b"x"), Err(SourceError::NotOpen));
        source.close();
    }

    #[test]
    fn missing_port_fails_to_open() {
        let mut source = SerialSource::for_decoder("/dev/airlog-does-not-exist", 9600, &PceAqd20Decoder::new());
        assert!(matches!(source.open(), Err(SourceError::Io(_))));
        assert!(!source.is_open());
    }
}
