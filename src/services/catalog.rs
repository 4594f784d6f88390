//! Catalog service: catalog schemas keyed by namespace and name.

use chrono::{DateTime, Utc};

use crate::codec::{
    expect_type, DynamicMessage, FieldDescriptor, Message, MessageDescriptor, SafeInt,
    ScalarKind, Value, ValueKind,
};
use crate::error::Result;
use crate::rpc::{MessageStream, ServiceClient, StreamingMethod, UnaryMethod};

pub const SERVICE: &str = "catalog.CatalogService";

pub const GET_CATALOG: UnaryMethod<GetCatalogRequest, Catalog> =
    UnaryMethod::new(SERVICE, "GetCatalog");
pub const CREATE_CATALOG: UnaryMethod<CreateCatalogRequest, Catalog> =
    UnaryMethod::new(SERVICE, "CreateCatalog");
pub const LIST_CATALOGS: StreamingMethod<ListCatalogsRequest, Catalog> =
    StreamingMethod::new(SERVICE, "ListCatalogs");

const STRING: ValueKind = ValueKind::Scalar(ScalarKind::String);
const INT64: ValueKind = ValueKind::Scalar(ScalarKind::Int64);
const DOUBLE: ValueKind = ValueKind::Scalar(ScalarKind::Double);
const UINT32: ValueKind = ValueKind::Scalar(ScalarKind::UInt32);
const BOOL: ValueKind = ValueKind::Scalar(ScalarKind::Bool);

pub static CATALOG: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.Catalog",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, STRING),
        FieldDescriptor::new("name", "name", 2, STRING),
        FieldDescriptor::new("public_name", "publicName", 3, STRING),
        FieldDescriptor::new("fields", "fields", 4, ValueKind::Message(&FIELD_SCHEMA)).repeated(),
        FieldDescriptor::new("created", "created", 100, ValueKind::Timestamp),
        FieldDescriptor::new("updated", "updated", 101, ValueKind::Timestamp),
        FieldDescriptor::new("version", "version", 102, INT64),
    ],
};

pub static FIELD_SCHEMA: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.FieldSchema",
    fields: &[
        FieldDescriptor::new("name", "name", 1, STRING),
        FieldDescriptor::new("int_schema", "intSchema", 2, ValueKind::Message(&INT_SCHEMA))
            .in_group("data"),
        FieldDescriptor::new("float_schema", "floatSchema", 3, ValueKind::Message(&FLOAT_SCHEMA))
            .in_group("data"),
        FieldDescriptor::new(
            "string_schema",
            "stringSchema",
            4,
            ValueKind::Message(&STRING_SCHEMA),
        )
        .in_group("data"),
        FieldDescriptor::new("bool_schema", "boolSchema", 5, ValueKind::Message(&BOOL_SCHEMA))
            .in_group("data"),
        FieldDescriptor::new("required", "required", 6, BOOL),
    ],
};

pub static INT_SCHEMA: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.IntSchema",
    fields: &[
        FieldDescriptor::new("min", "min", 1, INT64),
        FieldDescriptor::new("max", "max", 2, INT64),
    ],
};

pub static FLOAT_SCHEMA: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.FloatSchema",
    fields: &[
        FieldDescriptor::new("min", "min", 1, DOUBLE),
        FieldDescriptor::new("max", "max", 2, DOUBLE),
    ],
};

pub static STRING_SCHEMA: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.StringSchema",
    fields: &[
        FieldDescriptor::new("max_length", "maxLength", 1, UINT32),
        FieldDescriptor::new("pattern", "pattern", 2, STRING),
    ],
};

pub static BOOL_SCHEMA: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.BoolSchema",
    fields: &[FieldDescriptor::new("default_value", "defaultValue", 1, BOOL)],
};

pub static GET_CATALOG_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.GetCatalogRequest",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, STRING),
        FieldDescriptor::new("name", "name", 2, STRING),
    ],
};

pub static CREATE_CATALOG_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.CreateCatalogRequest",
    fields: &[FieldDescriptor::new("catalog", "catalog", 1, ValueKind::Message(&CATALOG))],
};

pub static LIST_CATALOGS_REQUEST: MessageDescriptor = MessageDescriptor {
    full_name: "catalog.ListCatalogsRequest",
    fields: &[
        FieldDescriptor::new("namespace", "namespace", 1, STRING),
        FieldDescriptor::new("limit", "limit", 2, UINT32),
    ],
};

/// A named collection of typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub namespace: String,
    pub name: String,
    pub public_name: String,
    pub fields: Vec<FieldSchema>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub version: SafeInt,
}

impl Message for Catalog {
    fn descriptor() -> &'static MessageDescriptor {
        &CATALOG
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&CATALOG);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::from(self.name.as_str()))
            .put(3, Value::from(self.public_name.as_str()))
            .put_messages(4, self.fields.as_slice())
            .put(102, Value::I64(self.version));
        if let Some(created) = self.created {
            msg.put(100, Value::Timestamp(created));
        }
        if let Some(updated) = self.updated {
            msg.put(101, Value::Timestamp(updated));
        }
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
            name: msg.string(2),
            public_name: msg.string(3),
            fields: msg.messages(4)?,
            created: msg.timestamp(100),
            updated: msg.timestamp(101),
            version: msg.int64(102),
        })
    }
}

/// One field of a catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub data: Option<FieldData>,
    pub required: bool,
}

/// Type constraints of a catalog field; at most one kind is set.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Int(IntSchema),
    Float(FloatSchema),
    String(StringSchema),
    Bool(BoolSchema),
}

impl Message for FieldSchema {
    fn descriptor() -> &'static MessageDescriptor {
        &FIELD_SCHEMA
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&FIELD_SCHEMA);
        msg.put(1, Value::from(self.name.as_str()))
            .put(6, Value::Bool(self.required));
        match &self.data {
            Some(FieldData::Int(v)) => {
                msg.put_message(2, Some(v));
            }
            Some(FieldData::Float(v)) => {
                msg.put_message(3, Some(v));
            }
            Some(FieldData::String(v)) => {
                msg.put_message(4, Some(v));
            }
            Some(FieldData::Bool(v)) => {
                msg.put_message(5, Some(v));
            }
            None => {}
        }
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        let data = match msg.which("data").map(|f| f.number) {
            Some(2) => msg.message(2)?.map(FieldData::Int),
            Some(3) => msg.message(3)?.map(FieldData::Float),
            Some(4) => msg.message(4)?.map(FieldData::String),
            Some(5) => msg.message(5)?.map(FieldData::Bool),
            _ => None,
        };
        Ok(Self {
            name: msg.string(1),
            data,
            required: msg.bool(6),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntSchema {
    pub min: SafeInt,
    pub max: SafeInt,
}

impl Message for IntSchema {
    fn descriptor() -> &'static MessageDescriptor {
        &INT_SCHEMA
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&INT_SCHEMA);
        msg.put(1, Value::I64(self.min)).put(2, Value::I64(self.max));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            min: msg.int64(1),
            max: msg.int64(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatSchema {
    pub min: f64,
    pub max: f64,
}

impl Message for FloatSchema {
    fn descriptor() -> &'static MessageDescriptor {
        &FLOAT_SCHEMA
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&FLOAT_SCHEMA);
        msg.put(1, Value::F64(self.min)).put(2, Value::F64(self.max));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            min: msg.f64(1),
            max: msg.f64(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringSchema {
    pub max_length: u32,
    pub pattern: String,
}

impl Message for StringSchema {
    fn descriptor() -> &'static MessageDescriptor {
        &STRING_SCHEMA
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&STRING_SCHEMA);
        msg.put(1, Value::U32(self.max_length))
            .put(2, Value::from(self.pattern.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            max_length: msg.u32(1),
            pattern: msg.string(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolSchema {
    pub default_value: bool,
}

impl Message for BoolSchema {
    fn descriptor() -> &'static MessageDescriptor {
        &BOOL_SCHEMA
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&BOOL_SCHEMA);
        msg.put(1, Value::Bool(self.default_value));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            default_value: msg.bool(1),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetCatalogRequest {
    pub namespace: String,
    pub name: String,
}

impl Message for GetCatalogRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &GET_CATALOG_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&GET_CATALOG_REQUEST);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::from(self.name.as_str()));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
            name: msg.string(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateCatalogRequest {
    pub catalog: Option<Catalog>,
}

impl Message for CreateCatalogRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &CREATE_CATALOG_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&CREATE_CATALOG_REQUEST);
        msg.put_message(1, self.catalog.as_ref());
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            catalog: msg.message(1)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListCatalogsRequest {
    pub namespace: String,
    /// Maximum number of catalogs to return; 0 means no limit.
    pub limit: u32,
}

impl Message for ListCatalogsRequest {
    fn descriptor() -> &'static MessageDescriptor {
        &LIST_CATALOGS_REQUEST
    }

    fn to_dynamic(&self) -> DynamicMessage {
        let mut msg = DynamicMessage::new(&LIST_CATALOGS_REQUEST);
        msg.put(1, Value::from(self.namespace.as_str()))
            .put(2, Value::U32(self.limit));
        msg
    }

    fn from_dynamic(msg: &DynamicMessage) -> Result<Self> {
        expect_type::<Self>(msg)?;
        Ok(Self {
            namespace: msg.string(1),
            limit: msg.u32(2),
        })
    }
}

/// Typed client for `catalog.CatalogService`.
#[derive(Clone)]
pub struct CatalogServiceClient {
    inner: ServiceClient,
}

impl CatalogServiceClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn get_catalog(&self, request: &GetCatalogRequest) -> Result<Catalog> {
        self.inner.unary(GET_CATALOG, request).await
    }

    pub async fn create_catalog(&self, request: &CreateCatalogRequest) -> Result<Catalog> {
        self.inner.unary(CREATE_CATALOG, request).await
    }

    pub async fn list_catalogs(
        &self,
        request: &ListCatalogsRequest,
    ) -> Result<MessageStream<Catalog>> {
        self.inner.server_streaming(LIST_CATALOGS, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeOptions;
    use crate::error::ProtostubError;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Catalog {
        Catalog {
            namespace: "ns1".to_string(),
            name: "cat".to_string(),
            public_name: "Cat".to_string(),
            fields: Vec::new(),
            created: None,
            updated: None,
            version: SafeInt::new(3).unwrap(),
        }
    }

    #[test]
    fn test_descriptors_valid() {
        for desc in [
            &CATALOG,
            &FIELD_SCHEMA,
            &INT_SCHEMA,
            &FLOAT_SCHEMA,
            &STRING_SCHEMA,
            &BOOL_SCHEMA,
            &GET_CATALOG_REQUEST,
            &CREATE_CATALOG_REQUEST,
            &LIST_CATALOGS_REQUEST,
        ] {
            desc.validate().unwrap();
        }
    }

    #[test]
    fn test_catalog_wire_bytes() {
        let bytes = sample().encode();
        assert_eq!(
            &bytes[..],
            &[
                0x0A, 0x03, b'n', b's', b'1', 0x12, 0x03, b'c', b'a', b't', 0x1A, 0x03, b'C',
                b'a', b't', 0xB0, 0x06, 0x03
            ]
        );
        let decoded = Catalog::decode(&bytes).unwrap();
        assert_eq!(decoded, sample());
        assert!(decoded.created.is_none());
        assert!(decoded.updated.is_none());
    }

    #[test]
    fn test_catalog_json() {
        let json = sample().to_json();
        assert_eq!(
            json,
            json!({"namespace": "ns1", "name": "cat", "publicName": "Cat", "version": 3})
        );
        assert_eq!(Catalog::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn test_field_schema_roundtrip() {
        let mut catalog = sample();
        catalog.created = Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        catalog.fields = vec![
            FieldSchema {
                name: "age".to_string(),
                data: Some(FieldData::Int(IntSchema {
                    min: SafeInt::ZERO,
                    max: SafeInt::new(150).unwrap(),
                })),
                required: true,
            },
            FieldSchema {
                name: "flag".to_string(),
                data: Some(FieldData::Bool(BoolSchema::default())),
                required: false,
            },
            FieldSchema {
                name: "untyped".to_string(),
                data: None,
                required: false,
            },
        ];
        assert_eq!(Catalog::decode(&catalog.encode()).unwrap(), catalog);
        assert_eq!(Catalog::from_json(&catalog.to_json()).unwrap(), catalog);
    }

    #[test]
    fn test_field_data_conflict() {
        // int_schema then string_schema in one FieldSchema.
        let bytes = [0x12, 0x00, 0x22, 0x00];
        let lenient = FieldSchema::decode(&bytes).unwrap();
        assert_eq!(lenient.data, Some(FieldData::String(StringSchema::default())));

        let strict = FieldSchema::decode_with(&bytes, DecodeOptions::strict());
        assert!(matches!(strict, Err(ProtostubError::GroupConflict { .. })));
    }

    #[test]
    fn test_from_partial() {
        let mut partial = DynamicMessage::partial(&CATALOG);
        partial.set(2, Value::from("cat")).unwrap();
        let catalog = Catalog::from_partial(&partial).unwrap();
        assert_eq!(catalog.name, "cat");
        assert_eq!(catalog.version, SafeInt::ZERO);

        let foreign = DynamicMessage::partial(&INT_SCHEMA);
        assert!(Catalog::from_partial(&foreign).is_err());
    }

    #[test]
    fn test_field_data_json_conflict_follows_document_order() {
        let bool_last: serde_json::Value = serde_json::from_str(
            r#"{"name": "f", "intSchema": {"min": 1}, "boolSchema": {"defaultValue": true}}"#,
        )
        .unwrap();
        let parsed = FieldSchema::from_json(&bool_last).unwrap();
        assert_eq!(
            parsed.data,
            Some(FieldData::Bool(BoolSchema {
                default_value: true
            }))
        );

        let int_last: serde_json::Value = serde_json::from_str(
            r#"{"name": "f", "boolSchema": {"defaultValue": true}, "intSchema": {"min": 1}}"#,
        )
        .unwrap();
        let parsed = FieldSchema::from_json(&int_last).unwrap();
        assert_eq!(
            parsed.data,
            Some(FieldData::Int(IntSchema {
                min: SafeInt::from(1),
                max: SafeInt::ZERO,
            }))
        );

        let err = FieldSchema::from_json_with(&int_last, DecodeOptions::strict()).unwrap_err();
        assert!(matches!(err, ProtostubError::GroupConflict { group: "data", .. }));
    }

    #[test]
    fn test_created_beyond_year_9999_rejected() {
        use crate::codec::wire::{write_length_delimited, write_tag, write_varint, WireKind};

        let mut body = Vec::new();
        write_tag(&mut body, 1, WireKind::Varint);
        write_varint(&mut body, 1_000_000_000_000);
        let mut bytes = Vec::new();
        write_tag(&mut bytes, 100, WireKind::LengthDelimited);
        write_length_delimited(&mut bytes, &body);

        let err = Catalog::decode(&bytes).unwrap_err();
        assert!(matches!(err, ProtostubError::Timestamp(_)));

        let far = json!({"created": "+33658-09-27T01:46:40.000Z"});
        assert!(Catalog::from_json(&far).is_err());
    }
}
