//! Binary encoding of descriptor-driven messages.
//!
//! Encoding walks the descriptor in declaration order. Decoding accepts
//! fields in any order: the last value of a singular field wins, repeated
//! fields accumulate, and unknown fields are skipped.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use super::safe_int::SafeInt;
use super::schema::{Cardinality, FieldDescriptor, MessageDescriptor, ScalarKind, ValueKind};
use super::timestamp::Timestamp;
use super::value::{DynamicMessage, Value};
use super::wire::{write_length_delimited, write_tag, write_varint, WireKind, WireReader};
use crate::error::{ProtostubError, Result};

/// Maximum nesting of message-valued fields accepted by the decoder.
pub const RECURSION_LIMIT: usize = 100;

/// Decoder behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Fail with [`ProtostubError::GroupConflict`] when two alternatives of
    /// one optional group appear in the same message. When unset the later
    /// alternative replaces the earlier one and a warning is logged.
    pub strict_groups: bool,
}

impl DecodeOptions {
    /// Options that reject optional group conflicts.
    pub const fn strict() -> Self {
        Self {
            strict_groups: true,
        }
    }
}

/// Encode a message into a new buffer.
pub fn encode_message(msg: &DynamicMessage) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(msg, &mut buf);
    buf.freeze()
}

/// Append the encoding of `msg` to `buf`.
pub fn encode_into<B: BufMut>(msg: &DynamicMessage, buf: &mut B) {
    for (field, value) in msg.fields() {
        match (field.cardinality, value) {
            (Cardinality::Repeated, Value::List(items)) => {
                for item in items {
                    encode_field(buf, field, item);
                }
            }
            (Cardinality::OptionalGroup(_), value) => encode_field(buf, field, value),
            (_, value) if value.is_default() => {}
            (_, value) => encode_field(buf, field, value),
        }
    }
}

fn encode_field<B: BufMut>(buf: &mut B, field: &FieldDescriptor, value: &Value) {
    write_tag(buf, field.number, field.wire_kind());
    match value {
        Value::Bool(v) => write_varint(buf, u64::from(*v)),
        // Negative values are sign-extended to ten bytes.
        Value::I32(v) | Value::Enum(v) => write_varint(buf, i64::from(*v) as u64),
        Value::U32(v) => write_varint(buf, u64::from(*v)),
        Value::I64(v) => write_varint(buf, v.to_wire()),
        Value::F32(v) => buf.put_u32_le(v.to_bits()),
        Value::F64(v) => buf.put_u64_le(v.to_bits()),
        Value::String(v) => write_length_delimited(buf, v.as_bytes()),
        Value::Bytes(v) => write_length_delimited(buf, v),
        Value::Message(nested) => {
            let mut body = BytesMut::new();
            encode_into(nested, &mut body);
            write_length_delimited(buf, &body);
        }
        Value::Timestamp(t) => {
            let mut body = BytesMut::new();
            Timestamp::from_datetime(t).encode(&mut body);
            write_length_delimited(buf, &body);
        }
        Value::List(_) => {
            debug_assert!(false, "nested list in field {}", field.name);
        }
    }
}

/// Decode a complete message of type `descriptor` from `bytes`.
pub fn decode_message(
    descriptor: &'static MessageDescriptor,
    bytes: &[u8],
) -> Result<DynamicMessage> {
    decode_with(descriptor, bytes, DecodeOptions::default())
}

/// Decode with explicit options.
pub fn decode_with(
    descriptor: &'static MessageDescriptor,
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<DynamicMessage> {
    let mut reader = WireReader::new(bytes);
    decode_body(descriptor, &mut reader, options, 0)
}

fn decode_body(
    descriptor: &'static MessageDescriptor,
    reader: &mut WireReader<'_>,
    options: DecodeOptions,
    depth: usize,
) -> Result<DynamicMessage> {
    if depth > RECURSION_LIMIT {
        return Err(ProtostubError::Malformed(format!(
            "{} nested deeper than {RECURSION_LIMIT}",
            descriptor.full_name
        )));
    }

    let mut msg = DynamicMessage::new(descriptor);
    while !reader.is_empty() {
        let tag = reader.read_tag()?;
        let Some(field) = descriptor.field(tag.field_number) else {
            trace!(
                message = descriptor.full_name,
                field = tag.field_number,
                "skipping unknown field"
            );
            reader.skip_field(tag)?;
            continue;
        };

        if tag.wire_kind != field.wire_kind() {
            if field.is_repeated()
                && field.kind.is_packable()
                && tag.wire_kind == WireKind::LengthDelimited
            {
                let mut packed = reader.sub_reader()?;
                while !packed.is_empty() {
                    let element = decode_value(field.kind, &mut packed, options, depth)?;
                    msg.push_unchecked(field, element);
                }
            } else {
                trace!(
                    message = descriptor.full_name,
                    field = field.name,
                    wire_kind = ?tag.wire_kind,
                    "skipping field with unexpected wire kind"
                );
                reader.skip_field(tag)?;
            }
            continue;
        }

        let value = decode_value(field.kind, reader, options, depth)?;
        match field.cardinality {
            Cardinality::Repeated => msg.push_unchecked(field, value),
            Cardinality::Single => {
                msg.store(field, value);
            }
            Cardinality::OptionalGroup(group) => {
                if let Some(previous) = msg.store(field, value) {
                    if options.strict_groups {
                        return Err(ProtostubError::GroupConflict {
                            message: descriptor.full_name,
                            group,
                        });
                    }
                    warn!(
                        message = descriptor.full_name,
                        group,
                        replaced = previous,
                        kept = field.number,
                        "conflicting optional group alternatives, keeping the last"
                    );
                }
            }
        }
    }
    Ok(msg)
}

fn decode_value(
    kind: ValueKind,
    reader: &mut WireReader<'_>,
    options: DecodeOptions,
    depth: usize,
) -> Result<Value> {
    let value = match kind {
        ValueKind::Scalar(ScalarKind::Bool) => Value::Bool(reader.read_varint()? != 0),
        ValueKind::Scalar(ScalarKind::Int32) => Value::I32(reader.read_varint()? as i32),
        ValueKind::Scalar(ScalarKind::UInt32) => Value::U32(reader.read_varint()? as u32),
        ValueKind::Scalar(ScalarKind::Int64) => {
            Value::I64(SafeInt::from_wire_signed(reader.read_varint()?)?)
        }
        ValueKind::Scalar(ScalarKind::UInt64) => {
            Value::I64(SafeInt::from_wire_unsigned(reader.read_varint()?)?)
        }
        ValueKind::Scalar(ScalarKind::Float) => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        ValueKind::Scalar(ScalarKind::Double) => {
            Value::F64(f64::from_bits(reader.read_fixed64()?))
        }
        ValueKind::Scalar(ScalarKind::String) => {
            Value::String(String::from_utf8(reader.read_length_delimited()?.to_vec())?)
        }
        ValueKind::Scalar(ScalarKind::Bytes) => {
            Value::Bytes(Bytes::copy_from_slice(reader.read_length_delimited()?))
        }
        ValueKind::Enum(desc) => Value::Enum(desc.normalize(reader.read_varint()? as i32)),
        ValueKind::Message(desc) => {
            let mut nested = reader.sub_reader()?;
            Value::Message(decode_body(desc, &mut nested, options, depth + 1)?)
        }
        ValueKind::Timestamp => {
            let mut nested = reader.sub_reader()?;
            Value::Timestamp(Timestamp::decode(&mut nested)?.to_datetime()?)
        }
    };
    Ok(value)
}
