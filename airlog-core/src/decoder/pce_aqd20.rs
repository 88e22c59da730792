//! PCE-AQD 20 fixed-width telemetry frames
//!
//! The logger streams a dataset as five 16-byte ASCII lines, one per
//! measurement:
//!
//! ```text
//! byte  0     1    2     3-4    5     6     7..=14      15
//!      STX  '4'  type  unit   sign   exp   magnitude   CR
//!      0x02      1-5   "H0"   '0'=+  0-9   00002150    0x0D
//! ```
//!
//! `value = sign * magnitude / 10^exp`. Type `1` opens a dataset, so it is the
//! frame the loop synchronizes on.

use alloc::string::ToString;

use crate::errors::{DecodeError, DecodeResult};
use crate::events::{fields, units, Measurement, Record};

use super::{FrameDecoder, Framing};

const MODEL: &str = "pce-aqd20";

/// Length of one frame including the CR terminator
pub const FRAME_LEN: usize = 16;

const STX: u8 = 0x02;
const TAG: u8 = b'4';
const FIRST_TYPE: u8 = b'1';
const CR: u8 = b'\r';
const MAGNITUDE_DIGITS: core::ops::Range<usize> = 7..15;

/// Measurement selected by the type digit, in digit order
const MEASURING_TYPES: [&str; 5] = [
    fields::PM25,
    fields::HUMIDITY,
    fields::TEMPERATURE,
    fields::CO2,
    fields::PRESSURE,
];

/// Closed set of unit codes the device emits
const UNIT_CODES: [&[u8; 2]; 9] = [b"H0", b"04", b"02", b"78", b"19", b"80", b"01", b"91", b"G4"];

/// Decoder for PCE-AQD 20 air quality loggers
#[derive(Debug, Clone, Copy, Default)]
pub struct PceAqd20Decoder;

impl PceAqd20Decoder {
    pub fn new() -> Self {
        Self
    }

    fn malformed(reason: &'static str) -> DecodeError {
        DecodeError::malformed(MODEL, reason)
    }

    /// Map a unit code to its physical unit; unmapped members pass through
    fn unit(code: &[u8]) -> DecodeResult<&str> {
        if !UNIT_CODES.iter().any(|known| known.as_slice() == code) {
            return Err(Self::malformed("unknown unit code"));
        }
        let unit = match code {
            b"H0" => units::MICROGRAMS_PER_M3,
            b"04" => units::PERCENT,
            b"01" => units::CELSIUS,
            b"G4" => units::PPM,
            b"91" => units::HECTOPASCAL,
            other => core::str::from_utf8(other).map_err(|_| Self::malformed("unit code is not ASCII"))?,
        };
        Ok(unit)
    }

    fn digit(byte: u8) -> Option<u32> {
        byte.is_ascii_digit().then(|| u32::from(byte - b'0'))
    }
}

impl FrameDecoder for PceAqd20Decoder {
    fn model(&self) -> &'static str {
        MODEL
    }

    fn is_frame_start(&self, frame: &[u8]) -> bool {
        frame.len() > 2 && frame[0] == STX && frame[2] == FIRST_TYPE
    }

    fn decode(&self, frame: &[u8]) -> DecodeResult<Record> {
        if frame.len() != FRAME_LEN {
            return Err(Self::malformed("expected 16 bytes"));
        }
        if frame[0] != STX {
            return Err(Self::malformed("missing STX start marker"));
        }
        if frame[1] != TAG {
            return Err(Self::malformed("unexpected tag byte"));
        }

        let name = match frame[2] {
            b'1'..=b'5' => MEASURING_TYPES[usize::from(frame[2] - b'1')],
            _ => return Err(Self::malformed("measurement type outside 1-5")),
        };
        let unit = Self::unit(&frame[3..5])?;
        let sign = if frame[5] == b'0' { 1.0 } else { -1.0 };
        let exponent = Self::digit(frame[6]).ok_or(Self::malformed("exponent is not a digit"))?;

        let mut magnitude: u32 = 0;
        for &byte in &frame[MAGNITUDE_DIGITS] {
            let digit = Self::digit(byte).ok_or(Self::malformed("magnitude is not an 8-digit number"))?;
            magnitude = magnitude * 10 + digit;
        }

        if frame[15] != CR {
            return Err(Self::malformed("missing CR terminator"));
        }

        let value = sign * f64::from(magnitude) / f64::from(10u32.pow(exponent));

        let mut record = Record::new();
        record.insert(name.to_string(), Measurement::new(value, unit));
        Ok(record)
    }

    fn frames_per_event(&self) -> usize {
        MEASURING_TYPES.len()
    }

    fn framing(&self) -> Framing {
        Framing::terminated(CR, FRAME_LEN)
    }

    fn read_timeout_ms(&self) -> u64 {
        crate::constants::time::PCE_AQD20_READ_TIMEOUT_MS
    }
}
