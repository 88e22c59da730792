//! Capture-file transport
//!
//! Replays frames recorded from a device so the whole pipeline runs without
//! hardware. Two layouts are understood:
//!
//! - text: one frame per line. Only the `\n` line separator is removed, so a
//!   `\r` ending a PCE-AQD 20 line stays part of the frame.
//! - hex: one frame per line as hex digits (`6a ff 32` or `6aff32`), for binary
//!   payloads that may contain newline bytes. Chosen by the `.hex` extension.
//!
//! Once the capture is exhausted every read reports `WouldBlock` after waiting
//! for the idle delay, like a silent serial line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use airlog_core::decoder::Frame;
use airlog_core::errors::SourceError;
use airlog_core::source::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayFormat {
    Text,
    Hex,
}

impl ReplayFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") => Self::Hex,
            _ => Self::Text,
        }
    }
}

#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    format: ReplayFormat,
    idle: Duration,
    frames: Option<std::vec::IntoIter<Frame>>,
    written: Vec<Vec<u8>>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            format: ReplayFormat::from_path(&path),
            path,
            idle: Duration::ZERO,
            frames: None,
            written: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: ReplayFormat) -> Self {
        self.format = format;
        self
    }

    /// Delay of a read once the capture is exhausted
    pub fn with_idle_delay(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn format(&self) -> ReplayFormat {
        self.format
    }

    pub fn is_open(&self) -> bool {
        self.frames.is_some()
    }

    /// Frames not yet replayed
    pub fn remaining(&self) -> usize {
        self.frames.as_ref().map_or(0, |frames| frames.len())
    }

    /// Commands the loop sent to the "device"
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }
}

fn parse_text(bytes: &[u8]) -> Vec<Frame> {
    bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

fn parse_hex(text: &str) -> Result<Vec<Frame>, String> {
    let mut frames = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let digits: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.is_empty() {
            continue;
        }
        if digits.len() % 2 != 0 {
            return Err(format!("line {}: odd number of hex digits", number + 1));
        }
        let frame = digits
            .chunks(2)
            .map(|pair| {
                let byte: String = pair.iter().collect();
                u8::from_str_radix(&byte, 16).map_err(|_| format!("line {}: invalid hex byte {:?}", number + 1, byte))
            })
            .collect::<Result<Frame, _>>()?;
        frames.push(frame);
    }
    Ok(frames)
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<(), SourceError> {
        let bytes = fs::read(&self.path).map_err(|e| SourceError::Io(format!("{}: {}", self.path.display(), e)))?;
        let frames = match self.format {
            ReplayFormat::Text => parse_text(&bytes),
            ReplayFormat::Hex => {
                let text = String::from_utf8_lossy(&bytes);
                parse_hex(&text).map_err(|e| SourceError::Io(format!("{}: {}", self.path.display(), e)))?
            }
        };
        log::info!("Replaying {} frames from {}", frames.len(), self.path.display());
        self.frames = Some(frames.into_iter());
        Ok(())
    }

    fn read_frame(&mut self) -> nb::Result<Frame, SourceError> {
        let frames = self.frames.as_mut().ok_or(nb::Error::Other(SourceError::NotOpen))?;
        match frames.next() {
            Some(frame) => Ok(frame),
            None => {
                if !self.idle.is_zero() {
                    std::thread::sleep(self.idle);
                }
                Err(nb::Error::WouldBlock)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        if self.frames.is_none() {
            return Err(SourceError::NotOpen);
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        if self.frames.take().is_some() {
            log::debug!("Closed replay of {}", self.path.display());
        }
    }
}
