//! Xiaomi Mi temperature/humidity BLE notifications
//!
//! ```text
//! byte 0: temperature, low byte
//! byte 1: bit 7 sign, bits 0-6 temperature high bits
//! byte 2: relative humidity, percent
//! ```
//!
//! Temperature is reported in hundredths of a degree.

use alloc::string::ToString;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, DecodeResult};
use crate::events::{fields, units, Measurement, Record};

use super::FrameDecoder;

const MODEL: &str = "xiaomi-mi";

/// Notification payload length
pub const FRAME_LEN: usize = 3;

const SIGN_BIT: u8 = 0x80;
const LEGACY_OFFSET: i32 = 32767;

/// How a set sign bit turns into a negative temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SignCorrection {
    /// Subtract 32767 from the 15-bit magnitude. Matches data already on disk.
    #[default]
    Legacy,
    /// Read both bytes as a little-endian `i16`
    TwosComplement,
}

/// Decoder for Xiaomi Mi BLE thermometers
#[derive(Debug, Clone, Copy, Default)]
pub struct XiaomiMiDecoder {
    sign: SignCorrection,
}

impl XiaomiMiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sign_correction(sign: SignCorrection) -> Self {
        Self { sign }
    }

    pub fn sign_correction(&self) -> SignCorrection {
        self.sign
    }

    fn centidegrees(&self, low: u8, high: u8) -> i32 {
        match self.sign {
            SignCorrection::Legacy => {
                let magnitude = i32::from(high & !SIGN_BIT) << 8 | i32::from(low);
                if high & SIGN_BIT != 0 {
                    magnitude - LEGACY_OFFSET
                } else {
                    magnitude
                }
            }
            SignCorrection::TwosComplement => i32::from(i16::from_le_bytes([low, high])),
        }
    }
}

impl FrameDecoder for XiaomiMiDecoder {
    fn model(&self) -> &'static str {
        MODEL
    }

    fn is_frame_start(&self, frame: &[u8]) -> bool {
        frame.len() == FRAME_LEN
    }

    fn decode(&self, frame: &[u8]) -> DecodeResult<Record> {
        let [low, high, humidity] = <[u8; FRAME_LEN]>::try_from(frame)
            .map_err(|_| DecodeError::malformed(MODEL, "expected 3 bytes"))?;

        let temperature = f64::from(self.centidegrees(low, high)) / 100.0;

        let mut record = Record::new();
        record.insert(
            fields::TEMPERATURE.to_string(),
            Measurement::new(temperature, units::CELSIUS),
        );
        record.insert(
            fields::HUMIDITY.to_string(),
            Measurement::new(f64::from(humidity), units::PERCENT),
        );
        Ok(record)
    }
}
