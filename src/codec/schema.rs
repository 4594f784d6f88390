//! Static message schemas.
//!
//! A message type is described once, as a `static` [`MessageDescriptor`],
//! and every encode/decode/JSON operation is driven from that table.
//!
//! # Example
//!
//! ```
//! use protostub::codec::schema::{FieldDescriptor, MessageDescriptor, ScalarKind, ValueKind};
//!
//! static POINT: MessageDescriptor = MessageDescriptor {
//!     full_name: "geo.Point",
//!     fields: &[
//!         FieldDescriptor::new("x", "x", 1, ValueKind::Scalar(ScalarKind::Int32)),
//!         FieldDescriptor::new("y", "y", 2, ValueKind::Scalar(ScalarKind::Int32)),
//!         FieldDescriptor::new("tags", "tags", 3, ValueKind::Scalar(ScalarKind::String)).repeated(),
//!     ],
//! };
//!
//! assert!(POINT.validate().is_ok());
//! assert_eq!(POINT.field(2).unwrap().name, "y");
//! ```

use super::wire::{WireKind, MAX_FIELD_NUMBER};
use crate::error::{ProtostubError, Result};

/// Reserved number every enum maps unknown values to.
pub const UNRECOGNIZED: i32 = -1;

/// JSON name of [`UNRECOGNIZED`].
pub const UNRECOGNIZED_NAME: &str = "UNRECOGNIZED";

/// Scalar field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarKind {
    /// Wire kind for a single value of this type.
    pub const fn wire_kind(self) -> WireKind {
        match self {
            ScalarKind::Bool
            | ScalarKind::Int32
            | ScalarKind::UInt32
            | ScalarKind::Int64
            | ScalarKind::UInt64 => WireKind::Varint,
            ScalarKind::Float => WireKind::Fixed32,
            ScalarKind::Double => WireKind::Fixed64,
            ScalarKind::String | ScalarKind::Bytes => WireKind::LengthDelimited,
        }
    }
}

/// What a field holds.
#[derive(Clone, Copy)]
pub enum ValueKind {
    Scalar(ScalarKind),
    Enum(&'static EnumDescriptor),
    Message(&'static MessageDescriptor),
    /// Well-known `{seconds, nanos}` message mapped to a date-time.
    Timestamp,
}

impl ValueKind {
    /// Wire kind for a single value of this kind.
    pub const fn wire_kind(self) -> WireKind {
        match self {
            ValueKind::Scalar(scalar) => scalar.wire_kind(),
            ValueKind::Enum(_) => WireKind::Varint,
            ValueKind::Message(_) | ValueKind::Timestamp => WireKind::LengthDelimited,
        }
    }

    /// Messages and timestamps use presence instead of a zero value.
    pub const fn is_message_like(self) -> bool {
        matches!(self, ValueKind::Message(_) | ValueKind::Timestamp)
    }

    /// Numeric kinds accept packed encoding when repeated.
    pub const fn is_packable(self) -> bool {
        !matches!(self.wire_kind(), WireKind::LengthDelimited)
    }
}

// Descriptors may refer to themselves, so only names are printed.
impl std::fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Scalar(scalar) => write!(f, "Scalar({scalar:?})"),
            ValueKind::Enum(desc) => write!(f, "Enum({})", desc.full_name),
            ValueKind::Message(desc) => write!(f, "Message({})", desc.full_name),
            ValueKind::Timestamp => f.write_str("Timestamp"),
        }
    }
}

/// How many values a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// One value; zero values are elided.
    Single,
    /// Zero or more values, each with its own tag.
    Repeated,
    /// One alternative of the named group; at most one member is set.
    OptionalGroup(&'static str),
}

/// One field of a message.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Schema field name (`snake_case`).
    pub name: &'static str,
    /// JSON key (`lowerCamelCase`).
    pub json_name: &'static str,
    /// Field number, unique within the message.
    pub number: u32,
    pub kind: ValueKind,
    pub cardinality: Cardinality,
}

impl FieldDescriptor {
    /// A singular field.
    pub const fn new(
        name: &'static str,
        json_name: &'static str,
        number: u32,
        kind: ValueKind,
    ) -> Self {
        Self {
            name,
            json_name,
            number,
            kind,
            cardinality: Cardinality::Single,
        }
    }

    /// Make this field repeated.
    pub const fn repeated(self) -> Self {
        Self {
            cardinality: Cardinality::Repeated,
            ..self
        }
    }

    /// Make this field a member of the named optional group.
    pub const fn in_group(self, group: &'static str) -> Self {
        Self {
            cardinality: Cardinality::OptionalGroup(group),
            ..self
        }
    }

    /// Expected wire kind of one element.
    #[inline]
    pub const fn wire_kind(&self) -> WireKind {
        self.kind.wire_kind()
    }

    #[inline]
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Group name if this field is a group member.
    #[inline]
    pub fn group(&self) -> Option<&'static str> {
        match self.cardinality {
            Cardinality::OptionalGroup(group) => Some(group),
            _ => None,
        }
    }
}

/// Symbolic names for an enum's numbers.
#[derive(Debug)]
pub struct EnumDescriptor {
    pub full_name: &'static str,
    /// `(name, number)` pairs; the zero-numbered entry is the default.
    pub values: &'static [(&'static str, i32)],
}

impl EnumDescriptor {
    /// Whether `number` is declared.
    pub fn is_known(&self, number: i32) -> bool {
        self.values.iter().any(|&(_, n)| n == number)
    }

    /// Map undeclared numbers to [`UNRECOGNIZED`].
    pub fn normalize(&self, number: i32) -> i32 {
        if self.is_known(number) {
            number
        } else {
            UNRECOGNIZED
        }
    }

    /// Symbolic name, or `UNRECOGNIZED`.
    pub fn name_of(&self, number: i32) -> &'static str {
        self.values
            .iter()
            .find(|&&(_, n)| n == number)
            .map_or(UNRECOGNIZED_NAME, |&(name, _)| name)
    }

    /// Number for a symbolic name, or `UNRECOGNIZED`.
    pub fn number_of(&self, name: &str) -> i32 {
        self.values
            .iter()
            .find(|&&(n, _)| n == name)
            .map_or(UNRECOGNIZED, |&(_, number)| number)
    }
}

/// Schema of one message type.
#[derive(Debug)]
pub struct MessageDescriptor {
    /// `<package>.<Name>`.
    pub full_name: &'static str,
    /// Fields in declaration order; this is the encoding order.
    pub fields: &'static [FieldDescriptor],
}

impl MessageDescriptor {
    /// Look a field up by number.
    pub fn field(&self, number: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Look a field up by schema name or JSON name.
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.json_name == name)
    }

    /// Members of an optional group, in declaration order.
    pub fn group_members(
        &self,
        group: &'static str,
    ) -> impl Iterator<Item = &'static FieldDescriptor> + 'static {
        let fields: &'static [FieldDescriptor] = self.fields;
        fields.iter().filter(move |f| f.group() == Some(group))
    }

    /// Check that field numbers and names are unique and in range.
    pub fn validate(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(ProtostubError::Schema(format!(
                    "{}.{} has invalid number {}",
                    self.full_name, field.name, field.number
                )));
            }
            if let Some(dup) = self.fields[..index]
                .iter()
                .find(|f| f.number == field.number || f.name == field.name)
            {
                return Err(ProtostubError::Schema(format!(
                    "{}.{} collides with {}.{}",
                    self.full_name, field.name, self.full_name, dup.name
                )));
            }
            if field.is_repeated() && field.group().is_some() {
                return Err(ProtostubError::Schema(format!(
                    "{}.{} cannot be both repeated and grouped",
                    self.full_name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// Descriptor identity; descriptors are statics, so address equality is
/// type equality.
#[inline]
pub fn same_descriptor(a: &MessageDescriptor, b: &MessageDescriptor) -> bool {
    std::ptr::eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLOR: EnumDescriptor = EnumDescriptor {
        full_name: "test.Color",
        values: &[("COLOR_UNSPECIFIED", 0), ("RED", 1), ("BLUE", 2)],
    };

    static SHAPE: MessageDescriptor = MessageDescriptor {
        full_name: "test.Shape",
        fields: &[
            FieldDescriptor::new("name", "name", 1, ValueKind::Scalar(ScalarKind::String)),
            FieldDescriptor::new("color", "color", 2, ValueKind::Enum(&COLOR)),
            FieldDescriptor::new("circle", "circle", 3, ValueKind::Message(&SHAPE))
                .in_group("geometry"),
            FieldDescriptor::new("square", "square", 4, ValueKind::Message(&SHAPE))
                .in_group("geometry"),
            FieldDescriptor::new("points", "points", 5, ValueKind::Scalar(ScalarKind::Int32))
                .repeated(),
        ],
    };

    #[test]
    fn test_lookup() {
        assert_eq!(SHAPE.field(2).unwrap().name, "color");
        assert!(SHAPE.field(99).is_none());
        assert_eq!(SHAPE.field_by_name("points").unwrap().number, 5);
    }

    #[test]
    fn test_wire_kinds() {
        assert_eq!(SHAPE.field(1).unwrap().wire_kind(), WireKind::LengthDelimited);
        assert_eq!(SHAPE.field(2).unwrap().wire_kind(), WireKind::Varint);
        assert_eq!(SHAPE.field(3).unwrap().wire_kind(), WireKind::LengthDelimited);
        assert_eq!(ScalarKind::Float.wire_kind(), WireKind::Fixed32);
        assert_eq!(ScalarKind::Double.wire_kind(), WireKind::Fixed64);
    }

    #[test]
    fn test_group_members() {
        let members: Vec<_> = SHAPE.group_members("geometry").map(|f| f.number).collect();
        assert_eq!(members, vec![3, 4]);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(SHAPE.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_numbers() {
        static BAD: MessageDescriptor = MessageDescriptor {
            full_name: "test.Bad",
            fields: &[
                FieldDescriptor::new("a", "a", 1, ValueKind::Scalar(ScalarKind::Bool)),
                FieldDescriptor::new("b", "b", 1, ValueKind::Scalar(ScalarKind::Bool)),
            ],
        };
        assert!(BAD.validate().is_err());
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(COLOR.name_of(1), "RED");
        assert_eq!(COLOR.name_of(42), UNRECOGNIZED_NAME);
        assert_eq!(COLOR.number_of("BLUE"), 2);
        assert_eq!(COLOR.number_of("GREEN"), UNRECOGNIZED);
        assert_eq!(COLOR.normalize(7), UNRECOGNIZED);
        assert_eq!(COLOR.normalize(2), 2);
    }
}
