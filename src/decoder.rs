//! Decoder for the sensor's MiBeacon service data frames.
//!
//! Frames are recognised by their advertised length and the `0xFE95` service
//! data signature, then decoded through [`SUB_TYPES`]: each sub-type lists the
//! fields it carries. Supporting a new sub-type means adding a row there.

use std::fmt;

/// Service data AD type followed by UUID `0xFE95` little endian.
pub const SIGNATURE: [u8; 3] = [0x16, 0x95, 0xFE];
pub const MIBEACON_UUID16: u16 = 0xFE95;

const ACCEPTED_LENGTHS: [u8; 3] = [0x16, 0x17, 0x19];
const SIGNATURE_OFFSET: usize = 4;
const SUB_TYPE_OFFSET: usize = 18;
const VALUE_OFFSET: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    Temperature,
    Humidity,
    Battery,
}

impl ReadingKind {
    /// Name the reading is reported under.
    pub fn name(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "temperature",
            ReadingKind::Humidity => "humidity",
            ReadingKind::Battery => "battery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    Percent(u8),
    Decimal(f32),
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Percent(v) => write!(f, "{}", v),
            ReadingValue::Decimal(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedReading {
    pub kind: ReadingKind,
    pub value: ReadingValue,
}

#[derive(Debug, Clone, Copy)]
enum Width {
    U8,
    U16,
    I16,
}

impl Width {
    fn size(&self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 | Width::I16 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Field {
    kind: ReadingKind,
    offset: usize,
    width: Width,
    /// `None` keeps the raw integer as a percentage.
    scale: Option<f32>,
}

#[derive(Debug)]
pub struct SubType {
    pub id: u8,
    /// Whether readings of this sub-type are reported by default.
    pub forwarded: bool,
    fields: &'static [Field],
}

const TENTHS: Option<f32> = Some(10.0);

pub const SUB_TYPES: &[SubType] = &[
    SubType {
        id: 0x0D,
        forwarded: false,
        fields: &[
            Field {
                kind: ReadingKind::Temperature,
                offset: VALUE_OFFSET,
                width: Width::U16,
                scale: TENTHS,
            },
            Field {
                kind: ReadingKind::Humidity,
                offset: VALUE_OFFSET + 2,
                width: Width::U16,
                scale: TENTHS,
            },
        ],
    },
    SubType {
        id: 0x0A,
        forwarded: true,
        fields: &[Field {
            kind: ReadingKind::Battery,
            offset: VALUE_OFFSET,
            width: Width::U8,
            scale: None,
        }],
    },
    SubType {
        id: 0x04,
        forwarded: true,
        fields: &[Field {
            kind: ReadingKind::Temperature,
            offset: VALUE_OFFSET,
            width: Width::I16,
            scale: TENTHS,
        }],
    },
    SubType {
        id: 0x06,
        forwarded: true,
        fields: &[Field {
            kind: ReadingKind::Humidity,
            offset: VALUE_OFFSET,
            width: Width::U16,
            scale: TENTHS,
        }],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    OutOfBounds {
        offset: usize,
        width: usize,
        available: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::OutOfBounds {
                offset,
                width,
                available,
            } => write!(
                f,
                "field at offset {} ({} bytes) exceeds {} byte frame",
                offset, width, available
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, PartialEq)]
pub enum Decoded {
    Frame {
        sub_type: u8,
        forwarded: bool,
        readings: Vec<DecodedReading>,
    },
    /// Not a frame this decoder understands.
    Skip,
}

fn read_field(frame: &[u8], field: &Field) -> Result<ReadingValue, DecodeError> {
    let size = field.width.size();
    let bytes = frame
        .get(field.offset..field.offset + size)
        .ok_or(DecodeError::OutOfBounds {
            offset: field.offset,
            width: size,
            available: frame.len(),
        })?;

    let raw = match field.width {
        Width::U8 => bytes[0] as i32,
        Width::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        Width::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
    };

    Ok(match field.scale {
        Some(divisor) => ReadingValue::Decimal(raw as f32 / divisor),
        None => ReadingValue::Percent(raw as u8),
    })
}

/// Decodes a sensor payload whose advertised length is `length`.
pub fn decode(payload: &[u8], length: u8) -> Result<Decoded, DecodeError> {
    if !ACCEPTED_LENGTHS.contains(&length) {
        return Ok(Decoded::Skip);
    }

    let frame = &payload[..payload.len().min(length as usize)];
    let out_of_bounds = |offset: usize, width: usize| DecodeError::OutOfBounds {
        offset,
        width,
        available: frame.len(),
    };

    let signature = frame
        .get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE.len())
        .ok_or_else(|| out_of_bounds(SIGNATURE_OFFSET, SIGNATURE.len()))?;
    if signature != SIGNATURE {
        return Ok(Decoded::Skip);
    }

    let id = *frame
        .get(SUB_TYPE_OFFSET)
        .ok_or_else(|| out_of_bounds(SUB_TYPE_OFFSET, 1))?;
    let Some(sub_type) = SUB_TYPES.iter().find(|s| s.id == id) else {
        return Ok(Decoded::Skip);
    };

    let readings = sub_type
        .fields
        .iter()
        .map(|field| {
            Ok(DecodedReading {
                kind: field.kind,
                value: read_field(frame, field)?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Decoded::Frame {
        sub_type: sub_type.id,
        forwarded: sub_type.forwarded,
        readings,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a MiBeacon frame of `length` bytes with `value` at offset 21.
    pub(crate) fn frame(length: u8, sub_type: u8, value: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; length as usize];
        payload[..3].copy_from_slice(&[0x02, 0x01, 0x06]);
        payload[3] = length - 4;
        payload[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 3].copy_from_slice(&SIGNATURE);
        payload[SUB_TYPE_OFFSET] = sub_type;
        payload[SUB_TYPE_OFFSET + 1] = 0x10;
        payload[SUB_TYPE_OFFSET + 2] = value.len() as u8;
        payload[VALUE_OFFSET..VALUE_OFFSET + value.len()].copy_from_slice(value);
        payload
    }

    fn single(decoded: Decoded) -> DecodedReading {
        match decoded {
            Decoded::Frame { readings, .. } => {
                assert_eq!(readings.len(), 1);
                readings[0]
            }
            Decoded::Skip => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_unaccepted_lengths_skip() {
        let payload = frame(0x19, 0x04, &[0xD7, 0x00]);
        for length in (0u8..=0x1F).filter(|l| !ACCEPTED_LENGTHS.contains(l)) {
            assert_eq!(decode(&payload, length), Ok(Decoded::Skip), "length {:#x}", length);
        }
    }

    #[test]
    fn test_signature_mismatch_skips() {
        for position in SIGNATURE_OFFSET..SIGNATURE_OFFSET + 3 {
            let mut payload = frame(0x17, 0x04, &[0xD7, 0x00]);
            payload[position] ^= 0xFF;
            assert_eq!(decode(&payload, 0x17), Ok(Decoded::Skip));
        }
    }

    #[test]
    fn test_unknown_sub_type_skips() {
        let payload = frame(0x17, 0x07, &[0x01, 0x02]);
        assert_eq!(decode(&payload, 0x17), Ok(Decoded::Skip));
    }

    #[test]
    fn test_temperature() {
        for t in [21.5f32, 0.0, 19.9, 35.2] {
            let raw = (t * 10.0).round() as i16;
            let payload = frame(0x17, 0x04, &raw.to_le_bytes());
            let reading = single(decode(&payload, 0x17).unwrap());
            assert_eq!(reading.kind, ReadingKind::Temperature);
            let ReadingValue::Decimal(value) = reading.value else {
                panic!("temperature should be decimal");
            };
            assert!((value - t).abs() < 0.1, "{} decoded as {}", t, value);
        }
    }

    #[test]
    fn test_negative_temperature() {
        let payload = frame(0x17, 0x04, &(-32i16).to_le_bytes());
        let reading = single(decode(&payload, 0x17).unwrap());
        assert_eq!(reading.value.to_string(), "-3.2");
    }

    #[test]
    fn test_battery() {
        let payload = frame(0x16, 0x0A, &[42]);
        let reading = single(decode(&payload, 0x16).unwrap());
        assert_eq!(reading.kind, ReadingKind::Battery);
        assert_eq!(reading.value, ReadingValue::Percent(42));
        assert_eq!(reading.value.to_string(), "42");
    }

    #[test]
    fn test_humidity() {
        let payload = frame(0x17, 0x06, &455u16.to_le_bytes());
        let reading = single(decode(&payload, 0x17).unwrap());
        assert_eq!(reading.kind, ReadingKind::Humidity);
        assert_eq!(reading.value.to_string(), "45.5");
    }

    #[test]
    fn test_whole_value_renders_without_fraction() {
        let payload = frame(0x17, 0x04, &200i16.to_le_bytes());
        let reading = single(decode(&payload, 0x17).unwrap());
        assert_eq!(reading.value.to_string(), "20");
    }

    #[test]
    fn test_combined_is_not_forwarded() {
        let mut value = Vec::new();
        value.extend_from_slice(&215u16.to_le_bytes());
        value.extend_from_slice(&480u16.to_le_bytes());
        let payload = frame(0x19, 0x0D, &value);
        assert_eq!(
            decode(&payload, 0x19),
            Ok(Decoded::Frame {
                sub_type: 0x0D,
                forwarded: false,
                readings: vec![
                    DecodedReading {
                        kind: ReadingKind::Temperature,
                        value: ReadingValue::Decimal(21.5),
                    },
                    DecodedReading {
                        kind: ReadingKind::Humidity,
                        value: ReadingValue::Decimal(48.0),
                    },
                ],
            })
        );
    }

    #[test]
    fn test_combined_in_short_frame_is_out_of_bounds() {
        let payload = frame(0x16, 0x0D, &[0xD7]);
        assert_eq!(
            decode(&payload, 0x16),
            Err(DecodeError::OutOfBounds {
                offset: 21,
                width: 2,
                available: 22
            })
        );
    }

    #[test]
    fn test_payload_shorter_than_declared_length() {
        let payload = frame(0x17, 0x04, &[0xD7, 0x00]);
        assert!(matches!(
            decode(&payload[..10], 0x17),
            Err(DecodeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            decode(&payload[..22], 0x17),
            Err(DecodeError::OutOfBounds { offset: 21, .. })
        ));
    }
}
