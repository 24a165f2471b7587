//! Minimal protobuf wire-format encoder/decoder.
//!
//! The SABR wire messages are a fixed, reverse-engineered protobuf contract: field numbers
//! must be preserved bit-exactly, but there is no `.proto` file to compile, so field access is
//! hand-written rather than generated. This module provides the handful of primitives every
//! message in `proto::messages` needs: tag encode/decode, varint, length-delimited, and
//! sub-message framing.
//!
//! Note this is the *standard* protobuf LEB128 varint, distinct from the custom UMP varint
//! used by the outer frame (`crate::ump`).

use crate::error::{Result, SabrError};

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LEN: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

fn encode_tag(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    encode_varint(buf, ((field as u64) << 3) | wire_type as u64);
}

pub fn put_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    encode_tag(buf, field, WIRE_VARINT);
    encode_varint(buf, value);
}

pub fn put_bool_field(buf: &mut Vec<u8>, field: u32, value: bool) {
    put_varint_field(buf, field, value as u64);
}

pub fn put_i32_field(buf: &mut Vec<u8>, field: u32, value: i32) {
    put_varint_field(buf, field, value as u32 as u64);
}

pub fn put_i64_field(buf: &mut Vec<u8>, field: u32, value: i64) {
    put_varint_field(buf, field, value as u64);
}

pub fn put_u64_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    put_varint_field(buf, field, value);
}

pub fn put_float_field(buf: &mut Vec<u8>, field: u32, value: f32) {
    encode_tag(buf, field, WIRE_FIXED32);
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_bytes_field(buf: &mut Vec<u8>, field: u32, value: &[u8]) {
    encode_tag(buf, field, WIRE_LEN);
    encode_varint(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

pub fn put_string_field(buf: &mut Vec<u8>, field: u32, value: &str) {
    put_bytes_field(buf, field, value.as_bytes());
}

/// Encodes `body` (an already-serialized sub-message) as a length-delimited field.
pub fn put_message_field(buf: &mut Vec<u8>, field: u32, body: &[u8]) {
    put_bytes_field(buf, field, body);
}

/// A single decoded field: its number, wire type, and raw payload.
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Len(&'a [u8]),
    Fixed32(u32),
}

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = *self.data.get(self.pos).ok_or_else(|| {
                SabrError::Protocol("truncated varint in protobuf message".to_string())
            })?;
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 64 {
                return Err(SabrError::Protocol("varint too long".to_string()));
            }
        }
        Ok(result)
    }

    /// Returns the next `(field_number, value)` pair, or `None` at end of input.
    pub fn next_field(&mut self) -> Result<Option<(u32, WireValue<'a>)>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let tag = self.read_varint()?;
        let field = (tag >> 3) as u32;
        let wire_type = (tag & 0x7) as u8;
        let value = match wire_type {
            WIRE_VARINT => WireValue::Varint(self.read_varint()?),
            WIRE_FIXED64 => {
                let bytes = self.take(8)?;
                WireValue::Fixed64(u64::from_le_bytes(bytes.try_into().unwrap()))
            }
            WIRE_LEN => {
                let len = self.read_varint()? as usize;
                WireValue::Len(self.take(len)?)
            }
            WIRE_FIXED32 => {
                let bytes = self.take(4)?;
                WireValue::Fixed32(u32::from_le_bytes(bytes.try_into().unwrap()))
            }
            other => {
                return Err(SabrError::Protocol(format!("unsupported wire type {other}")));
            }
        };
        Ok(Some((field, value)))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            SabrError::Protocol("length-delimited field overflow".to_string())
        })?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| {
            SabrError::Protocol("truncated length-delimited field".to_string())
        })?;
        self.pos = end;
        Ok(slice)
    }
}

impl WireValue<'_> {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            WireValue::Varint(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Varint(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::Varint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Varint(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            WireValue::Fixed32(v) => Some(f32::from_bits(*v)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Len(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Result<Option<&str>> {
        match self {
            WireValue::Len(b) => std::str::from_utf8(b)
                .map(Some)
                .map_err(|e| SabrError::Protocol(format!("invalid utf-8 in string field: {e}"))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            let mut r = Reader::new(&buf);
            // simulate a field wrapper so next_field can be exercised too
            let mut wrapped = Vec::new();
            put_varint_field(&mut wrapped, 7, value);
            let mut r2 = Reader::new(&wrapped);
            let (field, wv) = r2.next_field().unwrap().unwrap();
            assert_eq!(field, 7);
            assert_eq!(wv.as_u64(), Some(value));
            // raw read_varint sanity (via next_field on a synthetic tag=0 varint wire type)
            let _ = &mut r;
        }
    }

    #[test]
    fn length_delimited_field_round_trip() {
        let mut buf = Vec::new();
        put_string_field(&mut buf, 5, "hello sabr");
        let mut r = Reader::new(&buf);
        let (field, wv) = r.next_field().unwrap().unwrap();
        assert_eq!(field, 5);
        assert_eq!(wv.as_str().unwrap(), Some("hello sabr"));
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn unknown_fields_are_skippable() {
        let mut buf = Vec::new();
        put_varint_field(&mut buf, 99, 12345);
        put_string_field(&mut buf, 2, "kept");
        let mut r = Reader::new(&buf);
        let (f1, _) = r.next_field().unwrap().unwrap();
        assert_eq!(f1, 99);
        let (f2, wv2) = r.next_field().unwrap().unwrap();
        assert_eq!(f2, 2);
        assert_eq!(wv2.as_str().unwrap(), Some("kept"));
    }
}
