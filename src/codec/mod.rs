//! Message codec.
//!
//! Messages are described by static [`MessageDescriptor`] tables and handled
//! by one descriptor-driven engine:
//!
//! - [`wire`] - varints, tags, length-delimited payloads, unknown-field skipping
//! - [`binary`] - message encode/decode over the wire primitives
//! - [`json`] - canonical JSON mapping
//! - [`Message`] - typed structs bridged to [`DynamicMessage`]
//!
//! # Example
//!
//! ```
//! use protostub::codec::{binary, DynamicMessage, MessageDescriptor, FieldDescriptor};
//! use protostub::codec::{ScalarKind, Value, ValueKind};
//!
//! static GREETING: MessageDescriptor = MessageDescriptor {
//!     full_name: "demo.Greeting",
//!     fields: &[FieldDescriptor::new("text", "text", 1, ValueKind::Scalar(ScalarKind::String))],
//! };
//!
//! let mut msg = DynamicMessage::new(&GREETING);
//! msg.set(1, Value::from("hi")).unwrap();
//!
//! let bytes = binary::encode_message(&msg);
//! assert_eq!(&bytes[..], &[0x0A, 0x02, b'h', b'i']);
//! assert_eq!(binary::decode_message(&GREETING, &bytes).unwrap(), msg);
//! ```

pub mod binary;
pub mod json;
mod message;
pub mod safe_int;
pub mod schema;
pub mod timestamp;
mod value;
pub mod wire;

pub use binary::DecodeOptions;
pub use message::{expect_type, Message};
pub use safe_int::SafeInt;
pub use schema::{
    Cardinality, EnumDescriptor, FieldDescriptor, MessageDescriptor, ScalarKind, ValueKind,
    UNRECOGNIZED,
};
pub use value::{DynamicMessage, Value};
