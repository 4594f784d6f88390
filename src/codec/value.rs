//! Descriptor-driven message values.
//!
//! [`DynamicMessage`] holds the fields of one message instance keyed by
//! field number. It is the single representation every codec path works
//! on; typed messages convert to and from it.
//!
//! A *complete* message (from [`DynamicMessage::new`], a decoder, or
//! [`DynamicMessage::from_partial`]) carries every scalar and repeated field,
//! zero-valued where unset. Message-valued fields and group alternatives are
//! present only when set. A *partial* message (from
//! [`DynamicMessage::partial`]) may omit anything.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::safe_int::SafeInt;
use super::schema::{
    same_descriptor, Cardinality, FieldDescriptor, MessageDescriptor, ScalarKind, ValueKind,
};
use super::timestamp::truncate_to_millis;
use crate::error::{ProtostubError, Result};

/// One field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    /// `int64` and `uint64` (the latter never negative).
    I64(SafeInt),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// Enum number; undeclared numbers are stored as `UNRECOGNIZED`.
    Enum(i32),
    Message(DynamicMessage),
    Timestamp(DateTime<Utc>),
    /// Elements of a repeated field.
    List(Vec<Value>),
}

impl Value {
    /// Zero value for a singular field of `kind`; `None` for message-like kinds.
    pub fn zero_of(kind: ValueKind) -> Option<Value> {
        let value = match kind {
            ValueKind::Scalar(ScalarKind::Bool) => Value::Bool(false),
            ValueKind::Scalar(ScalarKind::Int32) => Value::I32(0),
            ValueKind::Scalar(ScalarKind::UInt32) => Value::U32(0),
            ValueKind::Scalar(ScalarKind::Int64 | ScalarKind::UInt64) => Value::I64(SafeInt::ZERO),
            ValueKind::Scalar(ScalarKind::Float) => Value::F32(0.0),
            ValueKind::Scalar(ScalarKind::Double) => Value::F64(0.0),
            ValueKind::Scalar(ScalarKind::String) => Value::String(String::new()),
            ValueKind::Scalar(ScalarKind::Bytes) => Value::Bytes(Bytes::new()),
            ValueKind::Enum(_) => Value::Enum(0),
            ValueKind::Message(_) | ValueKind::Timestamp => return None,
        };
        Some(value)
    }

    /// Whether this value is elided from singular-field output.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Bool(v) => !v,
            Value::I32(v) => *v == 0,
            Value::U32(v) => *v == 0,
            Value::I64(v) => v.is_zero(),
            // -0.0 is written.
            Value::F32(v) => v.to_bits() == 0,
            Value::F64(v) => v.to_bits() == 0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Enum(v) => *v == 0,
            Value::Message(_) | Value::Timestamp(_) => false,
            Value::List(items) => items.is_empty(),
        }
    }

    /// Short name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::U32(_) => "uint32",
            Value::I64(_) => "int64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
        }
    }

    /// Build a list value.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Whether a single element fits `kind`.
    fn fits(&self, kind: ValueKind) -> bool {
        match (kind, self) {
            (ValueKind::Scalar(ScalarKind::Bool), Value::Bool(_))
            | (ValueKind::Scalar(ScalarKind::Int32), Value::I32(_))
            | (ValueKind::Scalar(ScalarKind::UInt32), Value::U32(_))
            | (ValueKind::Scalar(ScalarKind::Int64), Value::I64(_))
            | (ValueKind::Scalar(ScalarKind::Float), Value::F32(_))
            | (ValueKind::Scalar(ScalarKind::Double), Value::F64(_))
            | (ValueKind::Scalar(ScalarKind::String), Value::String(_))
            | (ValueKind::Scalar(ScalarKind::Bytes), Value::Bytes(_))
            | (ValueKind::Enum(_), Value::Enum(_))
            | (ValueKind::Timestamp, Value::Timestamp(_)) => true,
            (ValueKind::Scalar(ScalarKind::UInt64), Value::I64(v)) => v.get() >= 0,
            (ValueKind::Message(desc), Value::Message(msg)) => {
                same_descriptor(desc, msg.descriptor)
            }
            _ => false,
        }
    }

    /// Canonical in-memory form of an element of `kind`.
    fn normalized(self, kind: ValueKind) -> Value {
        match (kind, self) {
            (ValueKind::Enum(desc), Value::Enum(n)) => Value::Enum(desc.normalize(n)),
            (ValueKind::Timestamp, Value::Timestamp(t)) => Value::Timestamp(truncate_to_millis(t)),
            (_, other) => other,
        }
    }

    /// Fill nested partial messages.
    fn completed(&self) -> Value {
        match self {
            Value::Message(msg) => Value::Message(msg.from_partial()),
            Value::List(items) => Value::List(items.iter().map(Value::completed).collect()),
            other => other.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<SafeInt> for Value {
    fn from(v: SafeInt) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DynamicMessage> for Value {
    fn from(v: DynamicMessage) -> Self {
        Value::Message(v)
    }
}

/// A message instance described by a static [`MessageDescriptor`].
#[derive(Clone)]
pub struct DynamicMessage {
    descriptor: &'static MessageDescriptor,
    fields: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    /// Zero value of the message type.
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        let mut fields = BTreeMap::new();
        for field in descriptor.fields {
            match field.cardinality {
                Cardinality::Repeated => {
                    fields.insert(field.number, Value::List(Vec::new()));
                }
                Cardinality::Single => {
                    if let Some(zero) = Value::zero_of(field.kind) {
                        fields.insert(field.number, zero);
                    }
                }
                Cardinality::OptionalGroup(_) => {}
            }
        }
        Self { descriptor, fields }
    }

    /// Empty partial message; fields are filled by [`DynamicMessage::from_partial`].
    pub fn partial(descriptor: &'static MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Stored value of a field, if any.
    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    /// Stored value of a field by schema or JSON name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.descriptor
            .field_by_name(name)
            .and_then(|field| self.fields.get(&field.number))
    }

    /// Whether a value is stored for the field.
    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Set a field after checking the value against the schema.
    ///
    /// Setting one alternative of an optional group clears the others.
    pub fn set(&mut self, number: u32, value: Value) -> Result<()> {
        let field = self.descriptor.field(number).ok_or_else(|| {
            ProtostubError::Schema(format!(
                "{} has no field {}",
                self.descriptor.full_name, number
            ))
        })?;
        let value = self.checked(field, value)?;
        self.store(field, value);
        Ok(())
    }

    /// Set a field by schema or JSON name.
    pub fn set_by_name(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self.descriptor.field_by_name(name).ok_or_else(|| {
            ProtostubError::Schema(format!(
                "{} has no field '{}'",
                self.descriptor.full_name, name
            ))
        })?;
        self.set(field.number, value)
    }

    /// Builder form of [`DynamicMessage::set`].
    pub fn with(mut self, number: u32, value: impl Into<Value>) -> Result<Self> {
        self.set(number, value.into())?;
        Ok(self)
    }

    /// Append one element to a repeated field.
    pub fn push(&mut self, number: u32, element: Value) -> Result<()> {
        let field = self
            .descriptor
            .field(number)
            .filter(|f| f.is_repeated())
            .ok_or_else(|| {
                ProtostubError::Schema(format!(
                    "{} has no repeated field {}",
                    self.descriptor.full_name, number
                ))
            })?;
        if !element.fits(field.kind) {
            return Err(self.mismatch(field, &element));
        }
        self.push_unchecked(field, element.normalized(field.kind));
        Ok(())
    }

    /// Store a value produced by code that already matches the schema, such
    /// as a typed message conversion. Mismatches are caught in debug builds.
    pub fn put(&mut self, number: u32, value: Value) -> &mut Self {
        match self.descriptor.field(number) {
            Some(field) => {
                debug_assert!(
                    self.accepts(field, &value),
                    "{}.{} cannot hold {}",
                    self.descriptor.full_name,
                    field.name,
                    value.kind_name()
                );
                let value = match (field.cardinality, value) {
                    (Cardinality::Repeated, Value::List(items)) => Value::List(
                        items.into_iter().map(|v| v.normalized(field.kind)).collect(),
                    ),
                    (_, other) => other.normalized(field.kind),
                };
                self.store(field, value);
            }
            None => debug_assert!(false, "{} has no field {number}", self.descriptor.full_name),
        }
        self
    }

    /// Remove a field, returning its value. Scalars become absent, which only
    /// partial messages should be in.
    pub fn clear(&mut self, number: u32) -> Option<Value> {
        self.fields.remove(&number)
    }

    /// Currently set alternative of an optional group.
    pub fn which(&self, group: &'static str) -> Option<&'static FieldDescriptor> {
        self.descriptor
            .group_members(group)
            .find(|field| self.fields.contains_key(&field.number))
    }

    /// Stored fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldDescriptor, &Value)> + '_ {
        self.descriptor
            .fields
            .iter()
            .filter_map(move |field| self.fields.get(&field.number).map(|v| (field, v)))
    }

    /// Build a complete message from a partial one.
    ///
    /// Unset scalar and repeated fields take their zero value, present nested
    /// messages are completed recursively, absent ones stay absent. Never
    /// fails and `m.from_partial().from_partial() == m.from_partial()`.
    pub fn from_partial(&self) -> DynamicMessage {
        let mut out = DynamicMessage::new(self.descriptor);
        for (number, value) in &self.fields {
            out.fields.insert(*number, value.completed());
        }
        out
    }

    /// Store without validation; clears sibling group alternatives.
    /// Returns the field number of a displaced alternative, if any.
    pub(crate) fn store(&mut self, field: &'static FieldDescriptor, value: Value) -> Option<u32> {
        let mut displaced = None;
        if let Some(group) = field.group() {
            for sibling in self.descriptor.group_members(group) {
                if sibling.number != field.number && self.fields.remove(&sibling.number).is_some()
                {
                    displaced = Some(sibling.number);
                }
            }
        }
        self.fields.insert(field.number, value);
        displaced
    }

    pub(crate) fn push_unchecked(&mut self, field: &'static FieldDescriptor, element: Value) {
        match self.fields.get_mut(&field.number) {
            Some(Value::List(items)) => items.push(element),
            _ => {
                self.fields.insert(field.number, Value::List(vec![element]));
            }
        }
    }

    fn accepts(&self, field: &FieldDescriptor, value: &Value) -> bool {
        match (field.cardinality, value) {
            (Cardinality::Repeated, Value::List(items)) => items.iter().all(|v| v.fits(field.kind)),
            (Cardinality::Repeated, _) => false,
            (_, value) => value.fits(field.kind),
        }
    }

    fn checked(&self, field: &FieldDescriptor, value: Value) -> Result<Value> {
        if !self.accepts(field, &value) {
            return Err(self.mismatch(field, &value));
        }
        Ok(match (field.cardinality, value) {
            (Cardinality::Repeated, Value::List(items)) => Value::List(
                items.into_iter().map(|v| v.normalized(field.kind)).collect(),
            ),
            (_, other) => other.normalized(field.kind),
        })
    }

    fn mismatch(&self, field: &FieldDescriptor, value: &Value) -> ProtostubError {
        ProtostubError::Schema(format!(
            "{}.{} ({:?}, {:?}) cannot hold {}",
            self.descriptor.full_name,
            field.name,
            field.cardinality,
            field.kind,
            value.kind_name()
        ))
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        same_descriptor(self.descriptor, other.descriptor) && self.fields == other.fields
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.fields() {
            map.entry(&field.name, value);
        }
        map.finish()?;
        write!(f, " as {}", self.descriptor.full_name)
    }
}
