//! Minimal tag-based field codec.
//!
//! Every field starts with a tag `(field_number << 3) | wire_type`,
//! written as a varint (one byte for field numbers below 16):
//!
//! | wire type | meaning | body |
//! |---|---|---|
//! | 0 | varint | base-128 unsigned integer |
//! | 1 | fixed64 | 8 bytes (skipped only) |
//! | 2 | length-delimited | varint length + bytes (strings, nested messages) |
//! | 5 | fixed32 | 4 bytes little-endian (IEEE-754 `f32`) |
//!
//! Scalar fields holding their type's zero value are never written, and
//! a decoder fills absent fields with zero values. Unknown field numbers
//! are skipped by wire type so older servers tolerate newer clients.

use wayfarer_transport::varint::{decode_varint32, encode_varint32};

use crate::ProtocolError;

/// The low three bits of a field tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(ProtocolError::UnsupportedWireType(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// A message that can be written to and read from the field codec.
///
/// `Default` supplies the zero value of every field, which is exactly
/// what the decoder starts from before applying the fields it finds.
pub trait WireMessage: Default {
    /// Writes every non-default field.
    fn encode_fields(&self, w: &mut WireWriter);

    /// Applies one decoded field. Unknown field numbers must be ignored.
    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError>;

    /// Encodes the whole message into a fresh buffer.
    fn to_wire_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.encode_fields(&mut w);
        w.into_bytes()
    }

    /// Decodes a message from `buf`.
    fn from_wire_bytes(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        for field in WireReader::new(buf) {
            message.decode_field(field?)?;
        }
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// WireWriter
// ---------------------------------------------------------------------------

/// Appends tagged fields to a byte buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn tag(&mut self, field: u32, wire_type: WireType) {
        encode_varint32((field << 3) | wire_type as u32, &mut self.buf);
    }

    fn length_delimited(&mut self, field: u32, bytes: &[u8]) {
        self.tag(field, WireType::LengthDelimited);
        encode_varint32(bytes.len() as u32, &mut self.buf);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint field; omitted when zero.
    pub fn uint32(&mut self, field: u32, value: u32) {
        if value != 0 {
            self.tag(field, WireType::Varint);
            encode_varint32(value, &mut self.buf);
        }
    }

    /// Writes a boolean as varint 1; omitted when `false`.
    pub fn bool(&mut self, field: u32, value: bool) {
        self.uint32(field, u32::from(value));
    }

    /// Writes a little-endian `f32`; omitted when zero.
    pub fn float(&mut self, field: u32, value: f32) {
        if value != 0.0 {
            self.tag(field, WireType::Fixed32);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Writes a UTF-8 string; omitted when empty.
    pub fn string(&mut self, field: u32, value: &str) {
        if !value.is_empty() {
            self.length_delimited(field, value.as_bytes());
        }
    }

    /// Writes a nested message. Always written, even when the nested
    /// message encodes to zero bytes, so its presence survives.
    pub fn message<M: WireMessage>(&mut self, field: u32, value: &M) {
        self.length_delimited(field, &value.to_wire_bytes());
    }
}

// ---------------------------------------------------------------------------
// WireReader
// ---------------------------------------------------------------------------

/// The body of one decoded field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32([u8; 4]),
}

/// One decoded field: its number and body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    fn mismatch(&self) -> ProtocolError {
        ProtocolError::WireTypeMismatch { field: self.number }
    }

    pub fn as_u32(&self) -> Result<u32, ProtocolError> {
        match self.value {
            // Wider values are truncated, matching protobuf's int32 rules.
            FieldValue::Varint(v) => Ok(v as u32),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ProtocolError> {
        match self.value {
            FieldValue::Varint(v) => Ok(v != 0),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_f32(&self) -> Result<f32, ProtocolError> {
        match self.value {
            FieldValue::Fixed32(bytes) => Ok(f32::from_le_bytes(bytes)),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_bytes(&self) -> Result<&'a [u8], ProtocolError> {
        match self.value {
            FieldValue::Bytes(bytes) => Ok(bytes),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_string(&self) -> Result<String, ProtocolError> {
        let bytes = self.as_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::InvalidUtf8 { field: self.number })
    }

    /// Decodes a nested message from a length-delimited field.
    pub fn as_message<M: WireMessage>(&self) -> Result<M, ProtocolError> {
        M::from_wire_bytes(self.as_bytes()?)
    }
}

/// Iterates over the fields of an encoded message.
///
/// Yields `Err` once and then stops if the buffer is corrupt.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos.checked_add(n).ok_or(ProtocolError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(ProtocolError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn varint32(&mut self) -> Result<u32, ProtocolError> {
        let (value, used) = decode_varint32(&self.buf[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    /// Reads a varint of up to 10 bytes, so 64-bit values written by
    /// other encoders can still be skipped.
    fn varint64(&mut self) -> Result<u64, ProtocolError> {
        let mut value: u64 = 0;
        for i in 0..10 {
            let byte = *self.buf.get(self.pos).ok_or(ProtocolError::Truncated)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::Varint(
            wayfarer_transport::varint::VarintError::TooLong,
        ))
    }

    fn read_field(&mut self) -> Result<Field<'a>, ProtocolError> {
        let tag = self.varint32()?;
        let number = tag >> 3;
        let value = match WireType::from_bits((tag & 0x07) as u8)? {
            WireType::Varint => FieldValue::Varint(self.varint64()?),
            WireType::Fixed64 => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed64(u64::from_le_bytes(raw))
            }
            WireType::LengthDelimited => {
                let len = self.varint32()? as usize;
                FieldValue::Bytes(self.take(len)?)
            }
            WireType::Fixed32 => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed32(raw)
            }
        };
        Ok(Field { number, value })
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = Result<Field<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let result = self.read_field();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
