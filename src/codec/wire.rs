//! Wire primitives shared by every message.
//!
//! Every encoded field starts with a tag:
//! ```text
//! ┌───────────────────────────────┬────────────┐
//! │ field number                  │ wire kind  │
//! │ bits 3..                      │ bits 0-2   │
//! └───────────────────────────────┴────────────┘
//!            emitted as a base-128 varint
//! ```
//!
//! Varints are little-endian groups of 7 bits; the high bit of every byte
//! except the last is set. Length-delimited payloads are `varint(len) ++ bytes`.

use bytes::BufMut;

use crate::error::{ProtostubError, Result};

/// Longest valid varint encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest field number a tag may carry.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Nesting limit for legacy groups skipped as unknown fields.
const MAX_GROUP_DEPTH: usize = 64;

/// Physical encoding of a field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireKind {
    /// Base-128 varint.
    Varint = 0,
    /// 8 bytes, little-endian.
    Fixed64 = 1,
    /// Varint length prefix followed by that many bytes.
    LengthDelimited = 2,
    /// Legacy group start; only ever skipped.
    StartGroup = 3,
    /// Legacy group end; only ever skipped.
    EndGroup = 4,
    /// 4 bytes, little-endian.
    Fixed32 = 5,
}

impl WireKind {
    /// Parse the low three bits of a tag.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireKind::Varint),
            1 => Ok(WireKind::Fixed64),
            2 => Ok(WireKind::LengthDelimited),
            3 => Ok(WireKind::StartGroup),
            4 => Ok(WireKind::EndGroup),
            5 => Ok(WireKind::Fixed32),
            other => Err(ProtostubError::InvalidWireKind(other)),
        }
    }

    /// Numeric id written into the tag.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded field tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number from the schema.
    pub field_number: u32,
    /// Wire kind of the payload that follows.
    pub wire_kind: WireKind,
}

impl Tag {
    /// Create a tag.
    pub const fn new(field_number: u32, wire_kind: WireKind) -> Self {
        Self {
            field_number,
            wire_kind,
        }
    }

    /// The integer `(field_number << 3) | wire_kind` carried on the wire.
    #[inline]
    pub const fn key(self) -> u64 {
        ((self.field_number as u64) << 3) | self.wire_kind as u64
    }

    /// Split a tag key back into field number and wire kind.
    pub fn from_key(key: u64) -> Result<Self> {
        let field_number = key >> 3;
        if field_number == 0 || field_number > u64::from(MAX_FIELD_NUMBER) {
            return Err(ProtostubError::InvalidFieldNumber(field_number));
        }
        let wire_kind = WireKind::from_u8((key & 0x07) as u8)?;
        Ok(Self {
            field_number: field_number as u32,
            wire_kind,
        })
    }
}

/// Write a base-128 varint.
#[inline]
pub fn write_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes `write_varint` emits for `value`.
#[inline]
pub fn varint_len(value: u64) -> usize {
    // 1 byte per started group of 7 significant bits, minimum 1.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Write the tag for `field_number` with the given wire kind.
#[inline]
pub fn write_tag<B: BufMut>(buf: &mut B, field_number: u32, wire_kind: WireKind) {
    write_varint(buf, Tag::new(field_number, wire_kind).key());
}

/// Write `varint(len) ++ payload`.
#[inline]
pub fn write_length_delimited<B: BufMut>(buf: &mut B, payload: &[u8]) {
    write_varint(buf, payload.len() as u64);
    buf.put_slice(payload);
}

/// Decode a varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Example
///
/// ```
/// use protostub::codec::wire::decode_varint;
///
/// assert_eq!(decode_varint(&[0xAC, 0x02]).unwrap(), (300, 2));
/// ```
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (index, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte may only contribute the 64th bit.
        if index == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(ProtostubError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(ProtostubError::VarintOverflow)
    } else {
        Err(ProtostubError::truncated(buf.len() + 1, buf.len()))
    }
}

/// Forward-only cursor over one encoded message.
///
/// A reader never looks past the end of the slice it was created with, so
/// a nested message obtained through [`WireReader::sub_reader`] cannot
/// consume bytes belonging to its parent.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader over the whole of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in range.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True once the whole range has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Read one varint.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = decode_varint(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read and validate one tag.
    pub fn read_tag(&mut self) -> Result<Tag> {
        let key = self.read_varint()?;
        Tag::from_key(key)
    }

    /// Read exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtostubError::truncated(len, self.remaining()));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    /// Read a 4-byte little-endian value.
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an 8-byte little-endian value.
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a length prefix and return exactly that many bytes.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtostubError::truncated(usize::MAX, self.remaining()))?;
        self.read_bytes(len)
    }

    /// Read a length-delimited payload as an isolated reader.
    pub fn sub_reader(&mut self) -> Result<WireReader<'a>> {
        self.read_length_delimited().map(WireReader::new)
    }

    /// Consume the payload of a field without interpreting it.
    pub fn skip_field(&mut self, tag: Tag) -> Result<()> {
        self.skip_with_depth(tag, 0)
    }

    fn skip_with_depth(&mut self, tag: Tag, depth: usize) -> Result<()> {
        match tag.wire_kind {
            WireKind::Varint => self.read_varint().map(drop),
            WireKind::Fixed64 => self.read_bytes(8).map(drop),
            WireKind::LengthDelimited => self.read_length_delimited().map(drop),
            WireKind::Fixed32 => self.read_bytes(4).map(drop),
            WireKind::StartGroup => {
                if depth >= MAX_GROUP_DEPTH {
                    return Err(ProtostubError::Malformed(
                        "group nesting too deep".to_string(),
                    ));
                }
                loop {
                    let inner = self.read_tag()?;
                    if inner.wire_kind == WireKind::EndGroup {
                        if inner.field_number == tag.field_number {
                            return Ok(());
                        }
                        return Err(ProtostubError::Malformed(format!(
                            "end group {} does not match start group {}",
                            inner.field_number, tag.field_number
                        )));
                    }
                    self.skip_with_depth(inner, depth + 1)?;
                }
            }
            WireKind::EndGroup => Err(ProtostubError::Malformed(format!(
                "unexpected end group for field {}",
                tag.field_number
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        buf
    }

    #[test]
    fn test_varint_single_byte() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(1), vec![0x01]);
        assert_eq!(varint(127), vec![0x7F]);
    }

    #[test]
    fn test_varint_multi_byte() {
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xAC, 0x02]);
        assert_eq!(varint(u64::MAX).len(), MAX_VARINT_LEN);
        assert_eq!(*varint(u64::MAX).last().unwrap(), 0x01);
    }

    #[test]
    fn test_varint_len_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, 1 << 35, u64::MAX] {
            assert_eq!(varint_len(value), varint(value).len(), "value {value}");
        }
    }

    #[test]
    fn test_decode_varint_reports_consumed() {
        let mut bytes = varint(1 << 40);
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        let (value, consumed) = decode_varint(&bytes).unwrap();
        assert_eq!(value, 1 << 40);
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_decode_varint_truncated() {
        let result = decode_varint(&[0x80, 0x80]);
        assert!(matches!(result, Err(ProtostubError::Truncated { .. })));
        assert!(matches!(
            decode_varint(&[]),
            Err(ProtostubError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_varint_overflow() {
        // Tenth byte carries more than the 64th bit.
        let mut bytes = vec![0xFF; 9];
        bytes.push(0x02);
        assert!(matches!(
            decode_varint(&bytes),
            Err(ProtostubError::VarintOverflow)
        ));

        // Eleven bytes with continuation bits.
        let bytes = vec![0x80; 11];
        assert!(matches!(
            decode_varint(&bytes),
            Err(ProtostubError::VarintOverflow)
        ));
    }

    #[test]
    fn test_tag_key_layout() {
        assert_eq!(Tag::new(1, WireKind::LengthDelimited).key(), 0x0A);
        assert_eq!(Tag::new(2, WireKind::LengthDelimited).key(), 0x12);
        assert_eq!(Tag::new(3, WireKind::LengthDelimited).key(), 0x1A);

        let mut buf = Vec::new();
        write_tag(&mut buf, 102, WireKind::Varint);
        assert_eq!(buf, vec![0xB0, 0x06]);
    }

    #[test]
    fn test_tag_from_key_rejects_bad_values() {
        assert!(matches!(
            Tag::from_key(0x07),
            Err(ProtostubError::InvalidFieldNumber(0))
        ));
        assert!(matches!(
            Tag::from_key(0x02),
            Err(ProtostubError::InvalidFieldNumber(0))
        ));
        assert!(matches!(
            Tag::from_key((1 << 3) | 6),
            Err(ProtostubError::InvalidWireKind(6))
        ));
        let too_big = (u64::from(MAX_FIELD_NUMBER) + 1) << 3;
        assert!(Tag::from_key(too_big).is_err());
    }

    #[test]
    fn test_length_delimited_is_bounded() {
        let mut buf = Vec::new();
        write_length_delimited(&mut buf, b"abc");
        buf.extend_from_slice(b"tail");

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_length_delimited().unwrap(), b"abc");
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_length_delimited_truncated() {
        let buf = [0x05, b'a', b'b'];
        let mut reader = WireReader::new(&buf);
        let err = reader.read_length_delimited().unwrap_err();
        assert!(err.to_string().contains("needed 5"));
    }

    #[test]
    fn test_sub_reader_isolated_from_parent() {
        let mut buf = Vec::new();
        write_length_delimited(&mut buf, &[0x08, 0x01]);
        buf.extend_from_slice(&[0x10, 0x02]);

        let mut outer = WireReader::new(&buf);
        let mut inner = outer.sub_reader().unwrap();
        assert_eq!(inner.read_tag().unwrap(), Tag::new(1, WireKind::Varint));
        assert_eq!(inner.read_varint().unwrap(), 1);
        assert!(inner.is_empty());
        assert_eq!(outer.remaining(), 2);
    }

    #[test]
    fn test_skip_every_wire_kind() {
        let mut buf = Vec::new();
        write_tag(&mut buf, 1, WireKind::Varint);
        write_varint(&mut buf, 1 << 50);
        write_tag(&mut buf, 2, WireKind::Fixed64);
        buf.extend_from_slice(&[1; 8]);
        write_tag(&mut buf, 3, WireKind::LengthDelimited);
        write_length_delimited(&mut buf, b"skip me");
        write_tag(&mut buf, 4, WireKind::Fixed32);
        buf.extend_from_slice(&[2; 4]);
        write_tag(&mut buf, 5, WireKind::StartGroup);
        write_tag(&mut buf, 1, WireKind::Varint);
        write_varint(&mut buf, 9);
        write_tag(&mut buf, 5, WireKind::EndGroup);

        let mut reader = WireReader::new(&buf);
        while !reader.is_empty() {
            let tag = reader.read_tag().unwrap();
            reader.skip_field(tag).unwrap();
        }
        assert_eq!(reader.position(), buf.len());
    }

    #[test]
    fn test_skip_mismatched_end_group() {
        let mut buf = Vec::new();
        write_tag(&mut buf, 5, WireKind::StartGroup);
        write_tag(&mut buf, 6, WireKind::EndGroup);

        let mut reader = WireReader::new(&buf);
        let tag = reader.read_tag().unwrap();
        assert!(matches!(
            reader.skip_field(tag),
            Err(ProtostubError::Malformed(_))
        ));
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&9u64.to_le_bytes());
        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_fixed32().unwrap(), 7);
        assert_eq!(reader.read_fixed64().unwrap(), 9);
        assert!(reader.read_fixed32().is_err());
    }
}
