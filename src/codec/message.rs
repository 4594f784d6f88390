//! Typed messages.
//!
//! A typed message is a plain Rust struct that knows its descriptor and how
//! to convert to and from a [`DynamicMessage`]. Every codec operation is
//! provided on top of that conversion.

use bytes::{BufMut, Bytes};
use chrono::{DateTime, Utc};

use super::binary::{self, DecodeOptions};
use super::json;
use super::schema::{same_descriptor, MessageDescriptor};
use super::safe_int::SafeInt;
use super::value::{DynamicMessage, Value};
use crate::error::{ProtostubError, Result};

/// A message type with a static schema.
pub trait Message: Clone + Default + PartialEq + Send + Sync + 'static {
    /// Schema of this type.
    fn descriptor() -> &'static MessageDescriptor;

    /// Convert to the dynamic representation.
    fn to_dynamic(&self) -> DynamicMessage;

    /// Convert from a complete dynamic message of this type.
    fn from_dynamic(msg: &DynamicMessage) -> Result<Self>;

    /// Encode to wire format.
    fn encode(&self) -> Bytes {
        binary::encode_message(&self.to_dynamic())
    }

    /// Append the wire encoding to `buf`.
    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        binary::encode_into(&self.to_dynamic(), buf);
    }

    /// Decode from wire format.
    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with(bytes, DecodeOptions::default())
    }

    /// Decode with explicit options.
    fn decode_with(bytes: &[u8], options: DecodeOptions) -> Result<Self> {
        Self::from_dynamic(&binary::decode_with(Self::descriptor(), bytes, options)?)
    }

    /// Canonical JSON value.
    fn to_json(&self) -> serde_json::Value {
        json::to_json(&self.to_dynamic())
    }

    /// Build from a JSON value.
    fn from_json(value: &serde_json::Value) -> Result<Self> {
        Self::from_dynamic(&json::from_json(Self::descriptor(), value)?)
    }

    /// Build from a JSON value with explicit options.
    fn from_json_with(value: &serde_json::Value, options: DecodeOptions) -> Result<Self> {
        Self::from_dynamic(&json::from_json_with(Self::descriptor(), value, options)?)
    }

    /// Complete a partial dynamic message of this type.
    ///
    /// Fails only if `partial` was built for a different descriptor.
    fn from_partial(partial: &DynamicMessage) -> Result<Self> {
        Self::from_dynamic(&partial.from_partial())
    }
}

/// Check that `msg` was built for `M`.
pub fn expect_type<M: Message>(msg: &DynamicMessage) -> Result<()> {
    if same_descriptor(msg.descriptor(), M::descriptor()) {
        Ok(())
    } else {
        Err(ProtostubError::Schema(format!(
            "expected {}, got {}",
            M::descriptor().full_name,
            msg.descriptor().full_name
        )))
    }
}

/// Field accessors used by typed conversions. Absent or mismatched values
/// read as the zero value.
impl DynamicMessage {
    pub fn string(&self, number: u32) -> String {
        match self.get(number) {
            Some(Value::String(v)) => v.clone(),
            _ => String::new(),
        }
    }

    pub fn bool(&self, number: u32) -> bool {
        matches!(self.get(number), Some(Value::Bool(true)))
    }

    pub fn i32(&self, number: u32) -> i32 {
        match self.get(number) {
            Some(Value::I32(v)) => *v,
            _ => 0,
        }
    }

    pub fn u32(&self, number: u32) -> u32 {
        match self.get(number) {
            Some(Value::U32(v)) => *v,
            _ => 0,
        }
    }

    /// `int64` or `uint64` field.
    pub fn int64(&self, number: u32) -> SafeInt {
        match self.get(number) {
            Some(Value::I64(v)) => *v,
            _ => SafeInt::ZERO,
        }
    }

    pub fn f32(&self, number: u32) -> f32 {
        match self.get(number) {
            Some(Value::F32(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn f64(&self, number: u32) -> f64 {
        match self.get(number) {
            Some(Value::F64(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn bytes(&self, number: u32) -> Bytes {
        match self.get(number) {
            Some(Value::Bytes(v)) => v.clone(),
            _ => Bytes::new(),
        }
    }

    /// Enum number, already normalized.
    pub fn enum_value(&self, number: u32) -> i32 {
        match self.get(number) {
            Some(Value::Enum(v)) => *v,
            _ => 0,
        }
    }

    pub fn timestamp(&self, number: u32) -> Option<DateTime<Utc>> {
        match self.get(number) {
            Some(Value::Timestamp(v)) => Some(*v),
            _ => None,
        }
    }

    /// Elements of a repeated string field.
    pub fn strings(&self, number: u32) -> Vec<String> {
        match self.get(number) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(v) => Some(v.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A message-valued field converted to its typed form.
    pub fn message<M: Message>(&self, number: u32) -> Result<Option<M>> {
        match self.get(number) {
            Some(Value::Message(nested)) => M::from_dynamic(nested).map(Some),
            _ => Ok(None),
        }
    }

    /// Elements of a repeated message field converted to their typed form.
    pub fn messages<M: Message>(&self, number: u32) -> Result<Vec<M>> {
        match self.get(number) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Message(nested) => Some(M::from_dynamic(nested)),
                    _ => None,
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Store an optional typed message; `None` leaves the field absent.
    pub fn put_message<M: Message>(&mut self, number: u32, value: Option<&M>) -> &mut Self {
        if let Some(value) = value {
            self.put(number, Value::Message(value.to_dynamic()));
        }
        self
    }

    /// Store a repeated typed message field.
    pub fn put_messages<M: Message>(&mut self, number: u32, values: &[M]) -> &mut Self {
        let items = values.iter().map(|v| Value::Message(v.to_dynamic()));
        self.put(number, Value::list(items))
    }
}
