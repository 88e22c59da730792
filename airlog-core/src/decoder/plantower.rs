//! Plantower particulate sensor behind a JSON-speaking serial bridge
//!
//! The bridge board is undocumented. After it receives the start command it
//! pushes one JSON object per measurement, but the serial buffer often holds
//! boot chatter and stale short replies in front of it:
//!
//! ```text
//! garbage{"fun":"05"}{"cpm2.5":"12","cpm1.0":"8", ... 16 fields ... }
//!        ^ discarded  ^ the measurement object
//! ```
//!
//! The decoder tries every `{` in the buffer as the start of an object and
//! picks the first balanced one with exactly 16 top-level fields that decodes.
//! A truncated object or a stray quote in front of the measurement only costs
//! that one candidate. Keys and values may be quoted or bare.

use alloc::collections::BTreeMap;
use alloc::string::ToString;

use crate::errors::{DecodeError, DecodeResult};
use crate::events::{fields, units, Measurement, Record};

use super::{FrameDecoder, Framing};

const MODEL: &str = "plantower";

/// Number of top-level fields in a measurement object
pub const MEASUREMENT_FIELDS: usize = 16;

const START_SENDING: &[u8] = br#"{"fun":"05","flag":"1"}"#;
const STOP_SENDING: &[u8] = br#"{"fun":"05","flag":"0"}"#;

/// Wire key, measurement name, unit
const EXTRACTED: [(&str, &str, &str); 8] = [
    ("cpm2.5", "cpm25", units::MICROGRAMS_PER_M3),
    ("cpm1.0", "cpm10", units::MICROGRAMS_PER_M3),
    ("cpm10", "cpm100", units::MICROGRAMS_PER_M3),
    ("apm2.5", "apm25", units::MICROGRAMS_PER_M3),
    ("apm1.0", "apm10", units::MICROGRAMS_PER_M3),
    ("apm10", "apm100", units::MICROGRAMS_PER_M3),
    ("t", fields::TEMPERATURE, units::CELSIUS),
    ("r", fields::HUMIDITY, units::PERCENT),
];

/// Decoder for the Plantower JSON serial stream
#[derive(Debug, Clone, Copy, Default)]
pub struct PlantowerDecoder;

impl PlantowerDecoder {
    pub fn new() -> Self {
        Self
    }

    fn malformed(reason: &'static str) -> DecodeError {
        DecodeError::malformed(MODEL, reason)
    }

    fn parse_value(raw: &str, unit: &str) -> DecodeResult<Measurement> {
        let raw = unquote(raw);
        if raw == "null" {
            return Ok(Measurement::absent(unit));
        }
        raw.parse::<f64>()
            .map(|value| Measurement::new(value, unit))
            .map_err(|_| Self::malformed("non-numeric measurement value"))
    }

    fn decode_object(object: &[u8]) -> DecodeResult<Record> {
        let text = core::str::from_utf8(object).map_err(|_| Self::malformed("object is not UTF-8"))?;

        let mut pairs = BTreeMap::new();
        for field in top_level_fields(object) {
            let field = &text[field.start..field.end];
            let (key, value) = field.split_once(':').ok_or(Self::malformed("field without ':'"))?;
            pairs.insert(unquote(key), value);
        }

        let mut record = Record::new();
        for (key, name, unit) in EXTRACTED {
            let raw = pairs.get(key).ok_or(Self::malformed("missing measurement field"))?;
            record.insert(name.to_string(), Self::parse_value(raw, unit)?);
        }
        Ok(record)
    }
}

impl FrameDecoder for PlantowerDecoder {
    fn model(&self) -> &'static str {
        MODEL
    }

    fn is_frame_start(&self, frame: &[u8]) -> bool {
        frame.contains(&b'{')
    }

    fn decode(&self, frame: &[u8]) -> DecodeResult<Record> {
        let mut error = Self::malformed("no complete 16-field object");
        for candidate in objects(frame) {
            if top_level_fields(candidate).count() != MEASUREMENT_FIELDS {
                log::debug!("{}: skipping {}-byte object without {} fields", MODEL, candidate.len(), MEASUREMENT_FIELDS);
                continue;
            }
            match Self::decode_object(candidate) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    log::debug!("{}: skipping 16-field object: {}", MODEL, e);
                    error = e;
                }
            }
        }
        Err(error)
    }

    fn framing(&self) -> Framing {
        Framing::timeout_delimited(crate::constants::buffers::MAX_FRAME_LEN)
    }

    fn activation_command(&self) -> Option<&'static [u8]> {
        Some(START_SENDING)
    }

    fn deactivation_command(&self) -> Option<&'static [u8]> {
        Some(STOP_SENDING)
    }
}

/// Every balanced object in `buffer`, one candidate per `{`
///
/// A `{` whose object never closes is skipped and the search resumes right
/// after it, so an earlier truncated object cannot hide a later complete one.
fn objects(buffer: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut pos = 0;
    core::iter::from_fn(move || {
        while let Some(offset) = buffer.get(pos..)?.iter().position(|&b| b == b'{') {
            let start = pos + offset;
            pos = start + 1;
            if let Some(end) = balanced_end(buffer, start) {
                return Some(&buffer[start..=end]);
            }
        }
        None
    })
}

/// Index of the `}` closing the object opened at `start`
fn balanced_end(buffer: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &byte) in buffer.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte ranges (relative to `object`) of the comma-separated top-level fields
fn top_level_fields(object: &[u8]) -> impl Iterator<Item = core::ops::Range<usize>> + '_ {
    let inner_end = object.len().saturating_sub(1);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut field_start = 1;
    let mut i = 1;
    let mut done = inner_end <= 1;

    core::iter::from_fn(move || {
        while !done {
            if i >= inner_end {
                done = true;
                let range = field_start..inner_end;
                return (!object[range.clone()].iter().all(u8::is_ascii_whitespace)).then_some(range);
            }
            let byte = object[i];
            i += 1;
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    let range = field_start..i - 1;
                    field_start = i;
                    return Some(range);
                }
                _ => {}
            }
        }
        None
    })
}

fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use proptest::prelude::*;

    const MEASUREMENT: &str = r#"{"cpm2.5":"12","cpm1.0":"8","cpm10":"15","apm2.5":"11","apm1.0":"7","apm10":"14","aqi":"50","t":"21.5","r":"40.2","hcho":"0","co2":"400","tvoc":"0","ver":"1","seq":"3","pm03":"900","pm05":"300"}"#;

    #[test]
    fn decodes_quoted_object() {
        let record = PlantowerDecoder::new().decode(MEASUREMENT.as_bytes()).unwrap();

        assert_eq!(record.len(), 8);
        assert_eq!(record["cpm25"].value, Some(12.0));
        assert_eq!(record["cpm100"].value, Some(15.0));
        assert_eq!(record["apm10"].value, Some(7.0));
        assert_eq!(record[fields::TEMPERATURE].value, Some(21.5));
        assert_eq!(record[fields::TEMPERATURE].unit, units::CELSIUS);
        assert_eq!(record[fields::HUMIDITY].value, Some(40.2));
        assert!(!record.contains_key("aqi"));
    }

    #[test]
    fn skips_chatter_and_short_objects() {
        let buffer = "garbage{a:1}{cpm2.5:1,cpm1.0:2,cpm10:3,apm2.5:4,apm1.0:5,apm10:6,t:21.5,r:40,aqi:10,f1:0,f2:0,f3:0,f4:0,f5:0,f6:0,f7:0}";

        let record = PlantowerDecoder::new().decode(buffer.as_bytes()).unwrap();

        assert_eq!(record["cpm25"].value, Some(1.0));
        assert_eq!(record["apm100"].value, Some(6.0));
        assert_eq!(record[fields::TEMPERATURE].value, Some(21.5));
        assert_eq!(record[fields::HUMIDITY].value, Some(40.0));
    }

    const BARE: &str = "{cpm2.5:1,cpm1.0:2,cpm10:3,apm2.5:4,apm1.0:5,apm10:6,t:21.5,r:40,aqi:10,f1:0,f2:0,f3:0,f4:0,f5:0,f6:0,f7:0}";

    #[test]
    fn truncated_object_before_the_measurement() {
        let buffer = format!("{{cpm2.5:1,cpm1.0{}", BARE);
        let record = PlantowerDecoder::new().decode(buffer.as_bytes()).unwrap();
        assert_eq!(record["cpm10"].value, Some(2.0));
        assert_eq!(record[fields::HUMIDITY].value, Some(40.0));
    }

    #[test]
    fn stray_quote_in_chatter() {
        let buffer = format!("{{\"boot{}", BARE);
        let record = PlantowerDecoder::new().decode(buffer.as_bytes()).unwrap();
        assert_eq!(record["cpm25"].value, Some(1.0));

        let quoted = format!("\"boot{{{}", MEASUREMENT);
        let record = PlantowerDecoder::new().decode(quoted.as_bytes()).unwrap();
        assert_eq!(record[fields::TEMPERATURE].value, Some(21.5));
    }

    #[test]
    fn undecodable_object_does_not_hide_a_later_one() {
        let renamed = MEASUREMENT.replace(r#""t":"#, r#""x":"#);
        let buffer = format!("{}{}", renamed, MEASUREMENT);
        let record = PlantowerDecoder::new().decode(buffer.as_bytes()).unwrap();
        assert_eq!(record[fields::TEMPERATURE].value, Some(21.5));
    }

    #[test]
    fn null_becomes_absent() {
        let buffer = MEASUREMENT.replace(r#""t":"21.5""#, r#""t":null"#);
        let record = PlantowerDecoder::new().decode(buffer.as_bytes()).unwrap();
        assert!(record[fields::TEMPERATURE].is_absent());
    }

    #[test]
    fn exhausted_input_is_malformed() {
        let decoder = PlantowerDecoder::new();
        assert!(decoder.decode(b"").is_err());
        assert!(decoder.decode(b"garbage{a:1}{b:2}").is_err());
        assert!(decoder.decode(&MEASUREMENT.as_bytes()[..40]).is_err());
    }

    #[test]
    fn missing_or_bad_fields_are_malformed() {
        let decoder = PlantowerDecoder::new();
        let renamed = MEASUREMENT.replace(r#""t":"#, r#""x":"#);
        assert!(decoder.decode(renamed.as_bytes()).is_err());

        let bad_value = MEASUREMENT.replace(r#""r":"40.2""#, r#""r":"wet""#);
        assert!(decoder.decode(bad_value.as_bytes()).is_err());
    }

    #[test]
    fn nested_commas_do_not_count_as_fields() {
        let object = br#"{"a":[1,2,3],"b":{"c":1,"d":2},"e":"x,y"}"#;
        assert_eq!(top_level_fields(object).count(), 3);
        assert_eq!(top_level_fields(b"{}").count(), 0);
    }

    #[test]
    fn frame_start_needs_an_object() {
        let decoder = PlantowerDecoder::new();
        assert!(decoder.is_frame_start(b"noise{"));
        assert!(!decoder.is_frame_start(b"noise"));
    }

    proptest! {
        #[test]
        fn frame_start_is_pure(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let decoder = PlantowerDecoder::new();
            let first = decoder.is_frame_start(&bytes);
            prop_assert_eq!(first, decoder.is_frame_start(&bytes));
            prop_assert_eq!(first, bytes.contains(&b'{'));
        }
    }
}
