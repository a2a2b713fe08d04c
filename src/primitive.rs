//! Leaf objects: integers, floats and byte strings.

use crate::ast::Param;
use crate::codec::{clamp_to_length, stringz_bytes, trim_padding, Codec};
use crate::env::{Operand, Overrides};
use crate::error::{BinDataError, Result};
use crate::stream::{ByteReader, ByteWriter};
use crate::tree::{truth, ObjectId, State, Tree};
use crate::value::Value;

impl Tree {
    /// Current value: computed `value`, else the stored one, else
    /// `initial_value`, else the codec default. While a read is in
    /// progress a value already read wins over `value`.
    pub(crate) fn primitive_value(&mut self, id: ObjectId, codec: Codec) -> Result<Value> {
        let v = self.raw_value(id, codec)?;
        if codec == Codec::String && self.flag(id, "trim_padding")? {
            let pad = self.pad_byte(id)?;
            if let Value::Bytes(bytes) = &v {
                return Ok(Value::Bytes(trim_padding(bytes, pad)));
            }
        }
        Ok(v)
    }

    /// Value as it is encoded: coerced, and for `string` clamped to `length`.
    fn raw_value(&mut self, id: ObjectId, codec: Codec) -> Result<Value> {
        let none = Overrides::none();
        let stored = match &self.node(id)?.state {
            State::Primitive(v) => v.clone(),
            _ => None,
        };
        let computed = match stored {
            Some(_) if self.reading => None,
            _ => self.eval_param(id, "value", &none)?,
        };
        let raw = match (computed, stored) {
            (Some(v), _) | (None, Some(v)) => v,
            (None, None) => match self.eval_param(id, "initial_value", &none)? {
                Some(v) => v,
                None => codec.default_value(),
            },
        };
        let v = codec.coerce(raw)?;
        match (codec, v) {
            (Codec::String, Value::Bytes(bytes)) => match self.eval_len(id, "length")? {
                Some(length) => {
                    let pad = self.pad_byte(id)?;
                    Ok(Value::Bytes(clamp_to_length(bytes, length, pad)))
                }
                None => Ok(Value::Bytes(bytes)),
            },
            (_, v) => Ok(v),
        }
    }

    pub(crate) fn read_primitive(
        &mut self,
        id: ObjectId,
        codec: Codec,
        reader: &mut dyn ByteReader,
    ) -> Result<()> {
        let value = match codec {
            Codec::Int(_) | Codec::Float(_) => {
                let n = codec.fixed_bytes().unwrap_or(0);
                codec.decode_fixed(&reader.read_bytes(n)?)
            }
            Codec::String => {
                let n = match self.eval_len(id, "read_length")? {
                    Some(n) => n,
                    None => self.eval_len(id, "length")?.unwrap_or(0),
                };
                Value::Bytes(reader.read_bytes(n)?)
            }
            Codec::Stringz => {
                let max = self.eval_len(id, "max_length")?;
                let mut out = Vec::new();
                let mut consumed = 0;
                while max.map_or(true, |m| consumed < m) {
                    let byte = reader.read_bytes(1)?;
                    consumed += 1;
                    match byte.first() {
                        Some(0) | None => break,
                        Some(b) => out.push(*b),
                    }
                }
                if let Some(m) = max {
                    out.truncate(m.saturating_sub(1));
                }
                Value::Bytes(out)
            }
        };
        log::trace!(target: "bindecl::read", "{} => {}", self.debug_name(id)?, value);
        self.node_mut(id)?.state = State::Primitive(Some(value));
        self.check_assert(id, codec)
    }

    fn check_assert(&mut self, id: ObjectId, codec: Codec) -> Result<()> {
        let Some(param) = self.param(id, "assert")? else {
            return Ok(());
        };
        let current = self.primitive_value(id, codec)?;
        let ok = match &param {
            Param::Value(expected) => codec.coerce(expected.clone())? == current,
            _ => {
                let overrides = Overrides::none().with("value", Operand::Value(current.clone()));
                let v = self.evaluate(id, &param, &overrides)?;
                truth(&v, "assert")?
            }
        };
        if ok {
            Ok(())
        } else {
            Err(BinDataError::AssertionFailed {
                debug_name: self.debug_name(id)?,
                value: current.to_string(),
            })
        }
    }

    pub(crate) fn write_primitive(
        &mut self,
        id: ObjectId,
        codec: Codec,
        writer: &mut dyn ByteWriter,
    ) -> Result<()> {
        let bytes = self.primitive_bytes(id, codec)?;
        writer.write_bytes(&bytes)
    }

    fn primitive_bytes(&mut self, id: ObjectId, codec: Codec) -> Result<Vec<u8>> {
        let v = self.raw_value(id, codec)?;
        match codec {
            Codec::Int(_) | Codec::Float(_) => Ok(codec.encode_fixed(&v)),
            Codec::String => Ok(v.as_bytes().map(<[u8]>::to_vec).unwrap_or_default()),
            Codec::Stringz => {
                let max = self.eval_len(id, "max_length")?;
                Ok(stringz_bytes(v.as_bytes().unwrap_or_default(), max))
            }
        }
    }

    pub(crate) fn primitive_num_bytes(&mut self, id: ObjectId, codec: Codec) -> Result<u64> {
        match codec.fixed_bytes() {
            Some(n) => Ok(n as u64),
            None => Ok(self.primitive_bytes(id, codec)?.len() as u64),
        }
    }

    pub(crate) fn assign_primitive(&mut self, id: ObjectId, codec: Codec, value: Value) -> Result<()> {
        let v = codec.coerce(value)?;
        self.node_mut(id)?.state = State::Primitive(Some(v));
        Ok(())
    }

    /// Evaluate a length-like parameter.
    pub(crate) fn eval_len(&mut self, id: ObjectId, key: &str) -> Result<Option<usize>> {
        match self.eval_param(id, key, &Overrides::none())? {
            Some(v) => v
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    BinDataError::Expression(format!("{} must be a non-negative integer, got {}", key, v))
                }),
            None => Ok(None),
        }
    }

    pub(crate) fn flag(&mut self, id: ObjectId, key: &str) -> Result<bool> {
        match self.eval_param(id, key, &Overrides::none())? {
            Some(v) => truth(&v, key),
            None => Ok(false),
        }
    }

    fn pad_byte(&mut self, id: ObjectId) -> Result<u8> {
        match self.eval_param(id, "pad_byte", &Overrides::none())? {
            None => Ok(0),
            Some(Value::Bytes(b)) if b.len() == 1 => Ok(b[0]),
            Some(v) => v
                .as_int()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| BinDataError::Argument(format!("pad_byte must be a single byte, got {}", v))),
        }
    }
}
