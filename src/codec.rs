//! Leaf codecs: raw bytes <-> decoded values for integers, floats and strings.
//!
//! Handles any byte width from 1 to 8 for integers (with explicit endianness),
//! IEEE single/double floats, and padded / zero-terminated byte strings.

use crate::ast::Endian;
use crate::error::{BinDataError, Result};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Fixed-width integer codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntCodec {
    pub bytes: usize,
    pub signed: bool,
    pub endian: Endian,
}

impl IntCodec {
    pub fn min(&self) -> i128 {
        if self.signed {
            -(1i128 << (self.bytes * 8 - 1))
        } else {
            0
        }
    }

    pub fn max(&self) -> i128 {
        if self.signed {
            (1i128 << (self.bytes * 8 - 1)) - 1
        } else {
            (1i128 << (self.bytes * 8)) - 1
        }
    }

    /// Assigned values are clamped into the representable range.
    pub fn clamp(&self, v: i128) -> i128 {
        v.clamp(self.min(), self.max())
    }

    pub fn decode(&self, buf: &[u8]) -> i128 {
        let raw = read_uint(buf, self.endian);
        let bits = self.bytes * 8;
        if self.signed && bits < 128 {
            let sign_bit = 1u64 << (bits - 1);
            if raw & sign_bit != 0 {
                return raw as i128 - (1i128 << bits);
            }
        }
        raw as i128
    }

    pub fn encode(&self, v: i128) -> Vec<u8> {
        let raw = (self.clamp(v) as i64) as u64;
        write_uint(raw, self.bytes, self.endian)
    }
}

/// IEEE-754 codec, single (`float`) or double precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatCodec {
    pub double: bool,
    pub endian: Endian,
}

impl FloatCodec {
    pub fn bytes(&self) -> usize {
        if self.double {
            8
        } else {
            4
        }
    }

    pub fn decode(&self, buf: &[u8]) -> f64 {
        match (self.double, self.endian) {
            (false, Endian::Little) => LittleEndian::read_f32(buf) as f64,
            (false, Endian::Big) => BigEndian::read_f32(buf) as f64,
            (true, Endian::Little) => LittleEndian::read_f64(buf),
            (true, Endian::Big) => BigEndian::read_f64(buf),
        }
    }

    pub fn encode(&self, v: f64) -> Vec<u8> {
        let mut buf = vec![0u8; self.bytes()];
        match (self.double, self.endian) {
            (false, Endian::Little) => LittleEndian::write_f32(&mut buf, v as f32),
            (false, Endian::Big) => BigEndian::write_f32(&mut buf, v as f32),
            (true, Endian::Little) => LittleEndian::write_f64(&mut buf, v),
            (true, Endian::Big) => BigEndian::write_f64(&mut buf, v),
        }
        buf
    }
}

/// The leaf codec behind a primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Int(IntCodec),
    Float(FloatCodec),
    /// Fixed or computed length byte string.
    String,
    /// Zero-terminated byte string.
    Stringz,
}

impl Codec {
    pub fn default_value(&self) -> Value {
        match self {
            Codec::Int(_) => Value::Int(0),
            Codec::Float(_) => Value::Float(0.0),
            Codec::String | Codec::Stringz => Value::Bytes(Vec::new()),
        }
    }

    /// Coerce an assigned value into the codec's value space.
    pub fn coerce(&self, v: Value) -> Result<Value> {
        match (self, v) {
            (Codec::Int(c), v) => match v.as_int() {
                Some(x) => Ok(Value::Int(c.clamp(x))),
                None => match v {
                    Value::Float(f) => Ok(Value::Int(c.clamp(f as i128))),
                    other => Err(mismatch("integer", &other)),
                },
            },
            (Codec::Float(_), v) => v
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| mismatch("float", &v)),
            (Codec::String | Codec::Stringz, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (Codec::String | Codec::Stringz, other) => Err(mismatch("bytes", &other)),
        }
    }

    /// Fixed encoded width, when the codec has one.
    pub fn fixed_bytes(&self) -> Option<usize> {
        match self {
            Codec::Int(c) => Some(c.bytes),
            Codec::Float(c) => Some(c.bytes()),
            Codec::String | Codec::Stringz => None,
        }
    }

    /// Decode a fixed-width value from exactly `fixed_bytes()` bytes.
    pub fn decode_fixed(&self, buf: &[u8]) -> Value {
        match self {
            Codec::Int(c) => Value::Int(c.decode(buf)),
            Codec::Float(c) => Value::Float(c.decode(buf)),
            Codec::String | Codec::Stringz => Value::Bytes(buf.to_vec()),
        }
    }

    /// Encode a fixed-width value.
    pub fn encode_fixed(&self, v: &Value) -> Vec<u8> {
        match self {
            Codec::Int(c) => c.encode(v.as_int().unwrap_or(0)),
            Codec::Float(c) => c.encode(v.as_f64().unwrap_or(0.0)),
            Codec::String | Codec::Stringz => v.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> BinDataError {
    BinDataError::Expression(format!("expected {} value, got {}", expected, got.kind_name()))
}

/// Pad with `pad_byte` or truncate so that `bytes` is exactly `length` long.
pub fn clamp_to_length(mut bytes: Vec<u8>, length: usize, pad_byte: u8) -> Vec<u8> {
    bytes.resize(length, pad_byte);
    bytes
}

/// Strip trailing `pad_byte`s.
pub fn trim_padding(bytes: &[u8], pad_byte: u8) -> Vec<u8> {
    let end = bytes
        .iter()
        .rposition(|&b| b != pad_byte)
        .map(|i| i + 1)
        .unwrap_or(0);
    bytes[..end].to_vec()
}

/// Zero-terminated string bytes, truncated so the terminator fits in `max_length`.
pub fn stringz_bytes(value: &[u8], max_length: Option<usize>) -> Vec<u8> {
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    let mut out = value[..end].to_vec();
    if let Some(max) = max_length {
        out.truncate(max.saturating_sub(1));
    }
    out.push(0);
    out
}

fn read_uint(buf: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Big => BigEndian::read_uint(buf, buf.len()),
        Endian::Little => LittleEndian::read_uint(buf, buf.len()),
    }
}

/// Low `len` bytes of `v`; the high bits of a sign-extended value are dropped.
fn write_uint(v: u64, len: usize, endian: Endian) -> Vec<u8> {
    let v = if len < 8 { v & ((1u64 << (len * 8)) - 1) } else { v };
    let mut buf = vec![0u8; len];
    match endian {
        Endian::Big => BigEndian::write_uint(&mut buf, v, len),
        Endian::Little => LittleEndian::write_uint(&mut buf, v, len),
    }
    buf
}
