//! Reference binary driver
//!
//! Encoding per component kind:
//! - Int: 1, 2, 4 or 8 bytes, two's complement for signed kinds
//! - Float: IEEE 754, 4 or 8 bytes
//! - Bool: one byte, 0 or 1
//! - Text, Bytes: length prefix + raw bytes (text is UTF-8)
//! - List: count prefix + items
//!
//! Byte order comes from `BinaryConfig` unless the settings carry
//! `big_endian` or `little_endian`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tessera_core::{BoxError, Settings, TesseraError, TesseraResult, Value, ValueType};
use tessera_stack::{Component, ComponentKind};

use crate::{Codec, Driver};

/// Byte order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Width of length and count prefixes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LengthPrefix {
    U8,
    U16,
    #[default]
    U32,
}

impl LengthPrefix {
    fn size(self) -> usize {
        match self {
            LengthPrefix::U8 => 1,
            LengthPrefix::U16 => 2,
            LengthPrefix::U32 => 4,
        }
    }

    fn max(self) -> usize {
        match self {
            LengthPrefix::U8 => u8::MAX as usize,
            LengthPrefix::U16 => u16::MAX as usize,
            LengthPrefix::U32 => u32::MAX as usize,
        }
    }
}

/// Binary driver configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinaryConfig {
    pub endian: Endian,
    pub length_prefix: LengthPrefix,
}

impl BinaryConfig {
    /// Little-endian with single-byte prefixes
    pub fn compact() -> Self {
        Self {
            endian: Endian::Little,
            length_prefix: LengthPrefix::U8,
        }
    }
}

/// Failures inside the binary codec
#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("Buffer too short: needed {needed}, got {available}")]
    BufferTooShort { needed: usize, available: usize },

    #[error("Expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: ValueType },

    #[error("{value} does not fit in {bits} bits")]
    Overflow { value: Value, bits: u16 },

    #[error("Length {0} exceeds the length prefix")]
    LengthOverflow(usize),

    #[error("Invalid bool byte: {0:#04x}")]
    InvalidBool(u8),

    #[error("Invalid UTF-8 in text field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Binary codec catalog
#[derive(Clone, Debug, Default)]
pub struct BinaryDriver {
    config: BinaryConfig,
}

impl BinaryDriver {
    pub const NAME: &'static str = "binary";

    pub fn new(config: BinaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }

    fn endian_for(&self, settings: &Settings) -> Endian {
        if settings.get_bool("big_endian") == Some(true) {
            Endian::Big
        } else if settings.get_bool("little_endian") == Some(true) {
            Endian::Little
        } else {
            self.config.endian
        }
    }

    fn check_kind(&self, kind: &ComponentKind) -> TesseraResult<()> {
        let supported = match kind {
            ComponentKind::Int { bits, .. } => matches!(bits, 8 | 16 | 32 | 64),
            ComponentKind::Float { bits } => matches!(bits, 32 | 64),
            ComponentKind::List(inner) => return self.check_kind(inner),
            _ => true,
        };
        if supported {
            Ok(())
        } else {
            Err(TesseraError::Unsupported {
                driver: Self::NAME.into(),
                kind: kind.name(),
            })
        }
    }
}

impl Driver for BinaryDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn codec(&self, component: &Component, settings: &Settings) -> TesseraResult<Box<dyn Codec>> {
        self.check_kind(component.kind())?;
        Ok(Box::new(BinaryCodec {
            kind: component.kind().clone(),
            endian: self.endian_for(settings),
            prefix: self.config.length_prefix,
        }))
    }
}

/// Codec for one component kind
#[derive(Clone, Debug)]
pub struct BinaryCodec {
    kind: ComponentKind,
    endian: Endian,
    prefix: LengthPrefix,
}

impl BinaryCodec {
    fn put_len(&self, len: usize, out: &mut BytesMut) -> Result<(), BinaryError> {
        if len > self.prefix.max() {
            return Err(BinaryError::LengthOverflow(len));
        }
        let n = self.prefix.size();
        match self.endian {
            Endian::Big => out.put_uint(len as u64, n),
            Endian::Little => out.put_uint_le(len as u64, n),
        }
        Ok(())
    }

    fn get_len(&self, input: &mut Bytes) -> Result<usize, BinaryError> {
        let n = self.prefix.size();
        ensure(input, n)?;
        let len = match self.endian {
            Endian::Big => input.get_uint(n),
            Endian::Little => input.get_uint_le(n),
        };
        Ok(len as usize)
    }

    fn dump_kind(&self, kind: &ComponentKind, value: &Value, out: &mut BytesMut) -> Result<(), BinaryError> {
        let mismatch = || BinaryError::TypeMismatch {
            expected: kind.name(),
            got: value.value_type(),
        };
        match kind {
            ComponentKind::Int { bits, signed } => {
                let n = usize::from(*bits / 8);
                let wide = value.as_i128().ok_or_else(mismatch)?;
                let (lo, hi) = tessera_stack::Constraint::int_bounds(*bits, *signed);
                if wide < lo || wide > hi {
                    return Err(BinaryError::Overflow {
                        value: value.clone(),
                        bits: *bits,
                    });
                }
                match (signed, self.endian) {
                    (true, Endian::Big) => out.put_int(wide as i64, n),
                    (true, Endian::Little) => out.put_int_le(wide as i64, n),
                    (false, Endian::Big) => out.put_uint(wide as u64, n),
                    (false, Endian::Little) => out.put_uint_le(wide as u64, n),
                }
            }
            ComponentKind::Float { bits } => {
                let v = value.as_float().ok_or_else(mismatch)?;
                match (bits, self.endian) {
                    (32, Endian::Big) => out.put_f32(v as f32),
                    (32, Endian::Little) => out.put_f32_le(v as f32),
                    (_, Endian::Big) => out.put_f64(v),
                    (_, Endian::Little) => out.put_f64_le(v),
                }
            }
            ComponentKind::Bool => out.put_u8(u8::from(value.as_bool().ok_or_else(mismatch)?)),
            ComponentKind::Text => {
                let s = value.as_str().ok_or_else(mismatch)?;
                self.put_len(s.len(), out)?;
                out.put_slice(s.as_bytes());
            }
            ComponentKind::Bytes => {
                let b = value.as_bytes().ok_or_else(mismatch)?;
                self.put_len(b.len(), out)?;
                out.put_slice(b);
            }
            ComponentKind::List(inner) => {
                let items = value.as_list().ok_or_else(mismatch)?;
                self.put_len(items.len(), out)?;
                for item in items {
                    self.dump_kind(inner, item, out)?;
                }
            }
        }
        Ok(())
    }

    fn load_kind(&self, kind: &ComponentKind, input: &mut Bytes) -> Result<Value, BinaryError> {
        let value = match kind {
            ComponentKind::Int { bits, signed } => {
                let n = usize::from(*bits / 8);
                ensure(input, n)?;
                match (signed, self.endian) {
                    (true, Endian::Big) => Value::Int(input.get_int(n)),
                    (true, Endian::Little) => Value::Int(input.get_int_le(n)),
                    (false, Endian::Big) => Value::UInt(input.get_uint(n)),
                    (false, Endian::Little) => Value::UInt(input.get_uint_le(n)),
                }
            }
            ComponentKind::Float { bits } => {
                let n = usize::from(*bits / 8);
                ensure(input, n)?;
                match (bits, self.endian) {
                    (32, Endian::Big) => Value::Float(f64::from(input.get_f32())),
                    (32, Endian::Little) => Value::Float(f64::from(input.get_f32_le())),
                    (_, Endian::Big) => Value::Float(input.get_f64()),
                    (_, Endian::Little) => Value::Float(input.get_f64_le()),
                }
            }
            ComponentKind::Bool => {
                ensure(input, 1)?;
                match input.get_u8() {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => return Err(BinaryError::InvalidBool(other)),
                }
            }
            ComponentKind::Text => {
                let len = self.get_len(input)?;
                ensure(input, len)?;
                Value::Text(String::from_utf8(input.split_to(len).to_vec())?)
            }
            ComponentKind::Bytes => {
                let len = self.get_len(input)?;
                ensure(input, len)?;
                Value::Bytes(input.split_to(len).to_vec())
            }
            ComponentKind::List(inner) => {
                let count = self.get_len(input)?;
                let mut items = Vec::with_capacity(count.min(input.len()));
                for _ in 0..count {
                    items.push(self.load_kind(inner, input)?);
                }
                Value::List(items)
            }
        };
        Ok(value)
    }
}

impl Codec for BinaryCodec {
    fn dump(&self, value: &Value, out: &mut BytesMut) -> Result<(), BoxError> {
        Ok(self.dump_kind(&self.kind, value, out)?)
    }

    fn load(&self, input: &mut Bytes) -> Result<Value, BoxError> {
        Ok(self.load_kind(&self.kind, input)?)
    }
}

fn ensure(input: &Bytes, needed: usize) -> Result<(), BinaryError> {
    if input.remaining() < needed {
        return Err(BinaryError::BufferTooShort {
            needed,
            available: input.remaining(),
        });
    }
    Ok(())
}
