//! COBS framed command link.
//!
//! Frames are delimited by `0x00`. The decoded payload is a tag byte followed
//! by little endian fields.

use crate::motors::controller::Diagnostics;
use heapless::Vec;
use strum::IntoStaticStr;

pub const FRAME_LEN: usize = 32;

const TAG_SET_TARGETS: u8 = 0x01;
const TAG_SET_GAINS: u8 = 0x02;
const TAG_STOP: u8 = 0x03;
const TAG_TELEMETRY: u8 = 0x81;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ticks per frame for each wheel
    SetTargets { left: i16, right: i16 },
    /// User constants, scaled by the control rate on the device
    SetGains { kp: i16, kd: i16, ki: i16, ko: i16 },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum FrameError {
    Overflow,
    Cobs,
    UnknownTag,
    Length,
}

impl ufmt::uDisplay for FrameError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

fn decode_cobs(data: &[u8]) -> Option<([u8; FRAME_LEN], usize)> {
    let mut temporary = [0; FRAME_LEN];
    let result = cobs::decode(data, &mut temporary);
    if let Ok(size) = result {
        return Some((temporary, size));
    }
    None
}

fn encode_cobs(data: &[u8]) -> Vec<u8, FRAME_LEN> {
    let mut temporary = [0; FRAME_LEN];
    let len = cobs::encode(data, &mut temporary);
    let mut frame = Vec::new();
    if let Some(encoded) = temporary.get(..len) {
        // Capacity is checked by the callers' payload sizes
        let _ = frame.extend_from_slice(encoded);
        let _ = frame.push(0);
    }
    frame
}

fn read_i16(payload: &[u8], index: usize) -> Result<i16, FrameError> {
    let offset = 1 + index * 2;
    payload
        .get(offset..offset + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i16::from_le_bytes)
        .ok_or(FrameError::Length)
}

impl Command {
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let Some(&tag) = payload.first() else {
            return Err(FrameError::Length);
        };
        let fields = match tag {
            TAG_SET_TARGETS => 2,
            TAG_SET_GAINS => 4,
            TAG_STOP => 0,
            _ => return Err(FrameError::UnknownTag),
        };
        if payload.len() != 1 + fields * 2 {
            return Err(FrameError::Length);
        }

        Ok(match tag {
            TAG_SET_TARGETS => Self::SetTargets {
                left: read_i16(payload, 0)?,
                right: read_i16(payload, 1)?,
            },
            TAG_SET_GAINS => Self::SetGains {
                kp: read_i16(payload, 0)?,
                kd: read_i16(payload, 1)?,
                ki: read_i16(payload, 2)?,
                ko: read_i16(payload, 3)?,
            },
            _ => Self::Stop,
        })
    }

    /// COBS encoded frame including the delimiter.
    pub fn encode(&self) -> Vec<u8, FRAME_LEN> {
        let mut payload: Vec<u8, 16> = Vec::new();
        let (tag, fields, count) = match *self {
            Self::SetTargets { left, right } => (TAG_SET_TARGETS, [left, right, 0, 0], 2),
            Self::SetGains { kp, kd, ki, ko } => (TAG_SET_GAINS, [kp, kd, ki, ko], 4),
            Self::Stop => (TAG_STOP, [0; 4], 0),
        };
        let _ = payload.push(tag);
        for field in fields.iter().take(count) {
            let _ = payload.extend_from_slice(&field.to_le_bytes());
        }
        encode_cobs(&payload)
    }
}

/// Telemetry frame with the controller state, COBS encoded including the delimiter.
pub fn encode_telemetry(diagnostics: &Diagnostics) -> Vec<u8, FRAME_LEN> {
    let mut payload: Vec<u8, 16> = Vec::new();
    let _ = payload.push(TAG_TELEMETRY);
    let _ = payload.push(u8::from(diagnostics.moving));
    let _ = payload.extend_from_slice(&diagnostics.output.left.to_le_bytes());
    let _ = payload.extend_from_slice(&diagnostics.output.right.to_le_bytes());
    let _ = payload.extend_from_slice(&diagnostics.left_encoder.to_le_bytes());
    let _ = payload.extend_from_slice(&diagnostics.right_encoder.to_le_bytes());
    encode_cobs(&payload)
}

/// Accumulates serial bytes until a frame delimiter.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8, FRAME_LEN>,
    overflowed: bool,
}

impl FrameReader {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one received byte. Returns a result once a complete frame arrived.
    pub fn push(&mut self, data: u8) -> Option<Result<Command, FrameError>> {
        if data != 0 {
            if self.buf.push(data).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        if self.buf.is_empty() && !self.overflowed {
            return None;
        }
        let result = if self.overflowed || self.buf.push(0).is_err() {
            Err(FrameError::Overflow)
        } else {
            decode_cobs(&self.buf).map_or(Err(FrameError::Cobs), |(decoded, size)| {
                decoded
                    .get(..size)
                    .map_or(Err(FrameError::Length), Command::decode)
            })
        };
        self.buf.clear();
        self.overflowed = false;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motors::DriveCommand;

    fn feed(reader: &mut FrameReader, bytes: &[u8]) -> Option<Result<Command, FrameError>> {
        let mut last = None;
        for byte in bytes {
            if let Some(result) = reader.push(*byte) {
                last = Some(result);
            }
        }
        last
    }

    #[test]
    fn reads_commands_from_stream() {
        let mut reader = FrameReader::new();
        let targets = Command::SetTargets { left: 40, right: -300 };
        let gains = Command::SetGains { kp: 20, kd: 12, ki: 0, ko: 50 };

        assert_eq!(feed(&mut reader, &targets.encode()), Some(Ok(targets)));
        assert_eq!(feed(&mut reader, &gains.encode()), Some(Ok(gains)));
        assert_eq!(feed(&mut reader, &Command::Stop.encode()), Some(Ok(Command::Stop)));
    }

    #[test]
    fn frames_contain_no_zero_before_delimiter() {
        let frame = Command::SetTargets { left: 0, right: 256 }.encode();
        let (delimiter, body) = frame.split_last().unwrap();
        assert_eq!(*delimiter, 0);
        assert!(!body.contains(&0));
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(Command::decode(&[]), Err(FrameError::Length));
        assert_eq!(Command::decode(&[0x7F, 1, 2]), Err(FrameError::UnknownTag));
        assert_eq!(Command::decode(&[TAG_SET_TARGETS, 1, 0, 2]), Err(FrameError::Length));
        assert_eq!(Command::decode(&[TAG_STOP, 1]), Err(FrameError::Length));
        assert_eq!(
            Command::decode(&[TAG_SET_TARGETS, 0x10, 0x00, 0xF0, 0xFF]),
            Ok(Command::SetTargets { left: 16, right: -16 })
        );
    }

    #[test]
    fn oversized_frame_is_dropped_and_reader_recovers() {
        let mut reader = FrameReader::new();
        let junk = [0x55; FRAME_LEN + 4];
        assert_eq!(feed(&mut reader, &junk), None);
        assert_eq!(reader.push(0), Some(Err(FrameError::Overflow)));

        let stop = Command::Stop.encode();
        assert_eq!(feed(&mut reader, &stop), Some(Ok(Command::Stop)));
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut reader = FrameReader::new();
        assert_eq!(reader.push(0), None);
        assert_eq!(reader.push(0), None);
    }

    #[test]
    fn telemetry_frame_layout() {
        let diagnostics = Diagnostics {
            moving: true,
            output: DriveCommand { left: 100, right: -30 },
            left_encoder: 70_000,
            right_encoder: -2,
        };
        let frame = encode_telemetry(&diagnostics);
        let (decoded, size) = decode_cobs(&frame).unwrap();
        let mut expected: Vec<u8, 16> = Vec::new();
        expected.extend_from_slice(&[TAG_TELEMETRY, 1]).unwrap();
        expected.extend_from_slice(&100i16.to_le_bytes()).unwrap();
        expected.extend_from_slice(&(-30i16).to_le_bytes()).unwrap();
        expected.extend_from_slice(&70_000i32.to_le_bytes()).unwrap();
        expected.extend_from_slice(&(-2i32).to_le_bytes()).unwrap();
        assert_eq!(&decoded[..size], expected.as_slice());
    }
}
