//! JSON mapping of descriptor-driven messages.
//!
//! Keys are the fields' `json_name`s (the schema name is accepted on input).
//! Zero-valued singular fields and empty repeated fields are left out.
//! 64-bit integers are written as JSON numbers, which is lossless because
//! they are bounded by the safe integer range; numeric strings are accepted
//! when reading. Bytes use standard base64, timestamps RFC 3339 with
//! milliseconds, enums their symbolic name.
//!
//! Object keys are read in document order, so when two alternatives of one
//! optional group are present the later key wins, with a warning.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{Map, Number, Value as Json};
use tracing::{trace, warn};

use super::binary::{DecodeOptions, RECURSION_LIMIT};
use super::safe_int::SafeInt;
use super::schema::{Cardinality, FieldDescriptor, MessageDescriptor, ScalarKind, ValueKind};
use super::timestamp::{parse_json_string, to_json_string};
use super::value::{DynamicMessage, Value};
use crate::error::{ProtostubError, Result};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Convert a message to a JSON object.
pub fn to_json(msg: &DynamicMessage) -> Json {
    let mut object = Map::new();
    for (field, value) in msg.fields() {
        let emit = match (field.cardinality, value) {
            (Cardinality::OptionalGroup(_), _) => true,
            (_, value) => !value.is_default(),
        };
        if emit {
            object.insert(field.json_name.to_string(), value_to_json(field.kind, value));
        }
    }
    Json::Object(object)
}

fn value_to_json(kind: ValueKind, value: &Value) -> Json {
    match value {
        Value::Bool(v) => Json::Bool(*v),
        Value::I32(v) => Json::from(*v),
        Value::U32(v) => Json::from(*v),
        Value::I64(v) => Json::from(v.get()),
        // Shortest decimal form of the f32, not its widened f64 expansion.
        Value::F32(v) => float_to_json(v.to_string().parse().unwrap_or(f64::from(*v))),
        Value::F64(v) => float_to_json(*v),
        Value::String(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::String(STANDARD.encode(v)),
        Value::Enum(n) => match kind {
            ValueKind::Enum(desc) => Json::String(desc.name_of(*n).to_string()),
            _ => Json::from(*n),
        },
        Value::Message(nested) => to_json(nested),
        Value::Timestamp(t) => Json::String(to_json_string(t)),
        Value::List(items) => Json::Array(items.iter().map(|v| value_to_json(kind, v)).collect()),
    }
}

fn float_to_json(v: f64) -> Json {
    match Number::from_f64(v) {
        Some(number) => Json::Number(number),
        None if v.is_nan() => Json::String(NAN.to_string()),
        None if v > 0.0 => Json::String(INFINITY.to_string()),
        None => Json::String(NEG_INFINITY.to_string()),
    }
}

/// Build a complete message from a JSON object.
///
/// Missing keys and `null` values yield zero values; unknown keys are
/// ignored.
pub fn from_json(descriptor: &'static MessageDescriptor, json: &Json) -> Result<DynamicMessage> {
    from_json_with(descriptor, json, DecodeOptions::default())
}

/// Build a message from a JSON object with explicit options.
///
/// Two keys naming alternatives of one optional group are a conflict: the
/// later key in the document wins unless `options.strict_groups` is set.
pub fn from_json_with(
    descriptor: &'static MessageDescriptor,
    json: &Json,
    options: DecodeOptions,
) -> Result<DynamicMessage> {
    message_from_json(descriptor, json, options, 0)
}

/// Parse JSON text and build a message from it.
pub fn from_json_str(descriptor: &'static MessageDescriptor, text: &str) -> Result<DynamicMessage> {
    let json: Json = serde_json::from_str(text)?;
    from_json(descriptor, &json)
}

fn message_from_json(
    descriptor: &'static MessageDescriptor,
    json: &Json,
    options: DecodeOptions,
    depth: usize,
) -> Result<DynamicMessage> {
    if depth > RECURSION_LIMIT {
        return Err(ProtostubError::InvalidJson(format!(
            "{} nested deeper than {RECURSION_LIMIT}",
            descriptor.full_name
        )));
    }
    let object = json.as_object().ok_or_else(|| {
        ProtostubError::InvalidJson(format!("{} expects an object", descriptor.full_name))
    })?;

    let mut msg = DynamicMessage::new(descriptor);
    for (key, json) in object {
        let Some(field) = descriptor.field_by_name(key) else {
            trace!(message = descriptor.full_name, key = %key, "ignoring unknown JSON key");
            continue;
        };
        if json.is_null() {
            continue;
        }
        let value = if field.is_repeated() {
            let items = json.as_array().ok_or_else(|| expected(field, "an array", json))?;
            Value::List(
                items
                    .iter()
                    .map(|item| element_from_json(field, item, options, depth))
                    .collect::<Result<_>>()?,
            )
        } else {
            element_from_json(field, json, options, depth)?
        };
        if let Some(group) = field.group() {
            if let Some(previous) = msg.which(group).filter(|f| f.number != field.number) {
                if options.strict_groups {
                    return Err(ProtostubError::GroupConflict {
                        message: descriptor.full_name,
                        group,
                    });
                }
                warn!(
                    message = descriptor.full_name,
                    group,
                    replaced = previous.number,
                    kept = field.number,
                    "conflicting optional group keys, keeping the last"
                );
            }
        }
        msg.set(field.number, value)?;
    }
    Ok(msg)
}

fn element_from_json(
    field: &FieldDescriptor,
    json: &Json,
    options: DecodeOptions,
    depth: usize,
) -> Result<Value> {
    let value = match field.kind {
        ValueKind::Scalar(ScalarKind::Bool) => {
            Value::Bool(json.as_bool().ok_or_else(|| expected(field, "a boolean", json))?)
        }
        ValueKind::Scalar(ScalarKind::Int32) => {
            let n = integer(field, json)?;
            Value::I32(i32::try_from(n).map_err(|_| out_of_range(field, n))?)
        }
        ValueKind::Scalar(ScalarKind::UInt32) => {
            let n = integer(field, json)?;
            Value::U32(u32::try_from(n).map_err(|_| out_of_range(field, n))?)
        }
        ValueKind::Scalar(ScalarKind::Int64) => Value::I64(safe_int(integer(field, json)?)?),
        ValueKind::Scalar(ScalarKind::UInt64) => {
            let n = integer(field, json)?;
            if n < 0 {
                return Err(out_of_range(field, n));
            }
            Value::I64(safe_int(n)?)
        }
        ValueKind::Scalar(ScalarKind::Float) => Value::F32(float(field, json)? as f32),
        ValueKind::Scalar(ScalarKind::Double) => Value::F64(float(field, json)?),
        ValueKind::Scalar(ScalarKind::String) => Value::String(
            json.as_str()
                .ok_or_else(|| expected(field, "a string", json))?
                .to_string(),
        ),
        ValueKind::Scalar(ScalarKind::Bytes) => {
            let text = json.as_str().ok_or_else(|| expected(field, "a base64 string", json))?;
            Value::Bytes(decode_base64(field, text)?)
        }
        ValueKind::Enum(desc) => match json {
            Json::String(name) => Value::Enum(desc.number_of(name)),
            Json::Number(_) => {
                let n = integer(field, json)?;
                Value::Enum(i32::try_from(n).map_err(|_| out_of_range(field, n))?)
            }
            other => return Err(expected(field, "an enum name or number", other)),
        },
        ValueKind::Message(desc) => {
            Value::Message(message_from_json(desc, json, options, depth + 1)?)
        }
        ValueKind::Timestamp => {
            let text = json.as_str().ok_or_else(|| expected(field, "an RFC 3339 string", json))?;
            Value::Timestamp(parse_json_string(text)?)
        }
    };
    Ok(value)
}

/// Integral JSON number or numeric string, widened so overflow can be reported.
fn integer(field: &FieldDescriptor, json: &Json) -> Result<i128> {
    match json {
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(i128::from(v))
            } else if let Some(v) = n.as_u64() {
                Ok(i128::from(v))
            } else {
                let v = n.as_f64().unwrap_or(f64::NAN);
                if v.is_finite() && v.fract() == 0.0 {
                    Ok(v as i128)
                } else {
                    Err(expected(field, "an integer", json))
                }
            }
        }
        Json::String(text) => text
            .trim()
            .parse::<i128>()
            .map_err(|_| expected(field, "an integer", json)),
        other => Err(expected(field, "an integer", other)),
    }
}

fn safe_int(n: i128) -> Result<SafeInt> {
    i64::try_from(n)
        .ok()
        .and_then(SafeInt::new)
        .ok_or(ProtostubError::IntegerOverflow(n))
}

fn float(field: &FieldDescriptor, json: &Json) -> Result<f64> {
    match json {
        Json::Number(n) => n.as_f64().ok_or_else(|| expected(field, "a number", json)),
        Json::String(text) => match text.as_str() {
            NAN => Ok(f64::NAN),
            INFINITY => Ok(f64::INFINITY),
            NEG_INFINITY => Ok(f64::NEG_INFINITY),
            other => other
                .trim()
                .parse::<f64>()
                .map_err(|_| expected(field, "a number", json)),
        },
        other => Err(expected(field, "a number", other)),
    }
}

fn decode_base64(field: &FieldDescriptor, text: &str) -> Result<Bytes> {
    STANDARD
        .decode(text)
        .or_else(|_| URL_SAFE.decode(text))
        .or_else(|_| STANDARD_NO_PAD.decode(text))
        .or_else(|_| URL_SAFE_NO_PAD.decode(text))
        .map(Bytes::from)
        .map_err(|e| ProtostubError::InvalidJson(format!("{}: {e}", field.name)))
}

fn expected(field: &FieldDescriptor, what: &str, got: &Json) -> ProtostubError {
    ProtostubError::InvalidJson(format!("{} expects {what}, got {got}", field.name))
}

fn out_of_range(field: &FieldDescriptor, n: i128) -> ProtostubError {
    ProtostubError::InvalidJson(format!("{} cannot hold {n}", field.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::schema::EnumDescriptor;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    static TONE: EnumDescriptor = EnumDescriptor {
        full_name: "test.Tone",
        values: &[("TONE_UNSPECIFIED", 0), ("WARM", 1)],
    };

    static RECORD: MessageDescriptor = MessageDescriptor {
        full_name: "test.Record",
        fields: &[
            FieldDescriptor::new("display_name", "displayName", 1, ValueKind::Scalar(ScalarKind::String)),
            FieldDescriptor::new("total", "total", 2, ValueKind::Scalar(ScalarKind::Int64)),
            FieldDescriptor::new("payload", "payload", 3, ValueKind::Scalar(ScalarKind::Bytes)),
            FieldDescriptor::new("tone", "tone", 4, ValueKind::Enum(&TONE)),
            FieldDescriptor::new("at", "at", 5, ValueKind::Timestamp),
            FieldDescriptor::new("gain", "gain", 6, ValueKind::Scalar(ScalarKind::Double)),
            FieldDescriptor::new("labels", "labels", 7, ValueKind::Scalar(ScalarKind::String))
                .repeated(),
            FieldDescriptor::new("inner", "inner", 8, ValueKind::Message(&RECORD)),
            FieldDescriptor::new("flag", "flag", 9, ValueKind::Scalar(ScalarKind::Bool))
                .in_group("choice"),
            FieldDescriptor::new("ratio", "ratio", 10, ValueKind::Scalar(ScalarKind::Float)),
        ],
    };

    #[test]
    fn test_zero_value_is_empty_object() {
        assert_eq!(to_json(&DynamicMessage::new(&RECORD)), json!({}));
        assert_eq!(
            from_json(&RECORD, &json!({})).unwrap(),
            DynamicMessage::new(&RECORD)
        );
    }

    #[test]
    fn test_field_mapping() {
        let mut msg = DynamicMessage::new(&RECORD);
        msg.set(1, Value::from("Ada")).unwrap();
        msg.set(2, Value::I64(SafeInt::new(42).unwrap())).unwrap();
        msg.set(3, Value::Bytes(Bytes::from_static(b"\x00\xff"))).unwrap();
        msg.set(4, Value::Enum(1)).unwrap();
        msg.set(5, Value::Timestamp(Utc.timestamp_millis_opt(1_500).unwrap()))
            .unwrap();
        msg.set(7, Value::list([Value::from("a"), Value::from("b")]))
            .unwrap();
        msg.set(8, Value::Message(DynamicMessage::new(&RECORD))).unwrap();
        msg.set(9, Value::Bool(false)).unwrap();
        msg.set(10, Value::F32(0.1)).unwrap();

        let json = to_json(&msg);
        assert_eq!(
            json,
            json!({
                "displayName": "Ada",
                "total": 42,
                "payload": "AP8=",
                "tone": "WARM",
                "at": "1970-01-01T00:00:01.500Z",
                "labels": ["a", "b"],
                "inner": {},
                "flag": false,
                "ratio": 0.1
            })
        );
        assert_eq!(from_json(&RECORD, &json).unwrap(), msg);
    }

    #[test]
    fn test_accepts_schema_names_and_strings() {
        let msg = from_json(
            &RECORD,
            &json!({"display_name": "x", "total": "12", "tone": 1, "payload": "AP8"}),
        )
        .unwrap();
        assert_eq!(msg.get(1), Some(&Value::from("x")));
        assert_eq!(msg.get(2), Some(&Value::I64(SafeInt::new(12).unwrap())));
        assert_eq!(msg.get(4), Some(&Value::Enum(1)));
        assert_eq!(msg.get(3), Some(&Value::Bytes(Bytes::from_static(b"\x00\xff"))));
    }

    #[test]
    fn test_null_and_unknown_keys() {
        let msg = from_json(&RECORD, &json!({"total": null, "mystery": [1, 2]})).unwrap();
        assert_eq!(msg, DynamicMessage::new(&RECORD));
    }

    #[test]
    fn test_unknown_enum() {
        let msg = from_json(&RECORD, &json!({"tone": "COLD"})).unwrap();
        assert_eq!(msg.get(4), Some(&Value::Enum(-1)));
        assert_eq!(to_json(&msg), json!({"tone": "UNRECOGNIZED"}));
    }

    #[test]
    fn test_int64_overflow_boundary() {
        let ok = from_json(&RECORD, &json!({"total": 9_007_199_254_740_991_i64})).unwrap();
        assert_eq!(ok.get(2), Some(&Value::I64(SafeInt::MAX)));
        assert!(matches!(
            from_json(&RECORD, &json!({"total": 9_007_199_254_740_992_i64})),
            Err(ProtostubError::IntegerOverflow(_))
        ));
        assert!(matches!(
            from_json(&RECORD, &json!({"total": "18446744073709551615"})),
            Err(ProtostubError::IntegerOverflow(_))
        ));
    }

    #[test]
    fn test_non_finite_floats() {
        let mut msg = DynamicMessage::new(&RECORD);
        msg.set(6, Value::F64(f64::NEG_INFINITY)).unwrap();
        let json = to_json(&msg);
        assert_eq!(json, json!({"gain": "-Infinity"}));
        assert_eq!(from_json(&RECORD, &json).unwrap(), msg);

        let nan = from_json(&RECORD, &json!({"gain": "NaN"})).unwrap();
        assert!(matches!(nan.get(6), Some(Value::F64(v)) if v.is_nan()));
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            from_json(&RECORD, &json!([])),
            Err(ProtostubError::InvalidJson(_))
        ));
        assert!(matches!(
            from_json(&RECORD, &json!({"labels": "a"})),
            Err(ProtostubError::InvalidJson(_))
        ));
        assert!(matches!(
            from_json(&RECORD, &json!({"at": "soon"})),
            Err(ProtostubError::Timestamp(_))
        ));
        assert!(from_json_str(&RECORD, "{not json").is_err());
    }

    static SHAPE: MessageDescriptor = MessageDescriptor {
        full_name: "test.Shape",
        fields: &[
            FieldDescriptor::new("circle", "circle", 1, ValueKind::Scalar(ScalarKind::Double))
                .in_group("kind"),
            FieldDescriptor::new("square", "square", 2, ValueKind::Scalar(ScalarKind::Double))
                .in_group("kind"),
        ],
    };

    #[test]
    fn test_group_conflict_keeps_later_key() {
        let msg = from_json_str(&SHAPE, r#"{"square": 2.0, "circle": 1.0}"#).unwrap();
        assert_eq!(msg.which("kind").map(|f| f.number), Some(1));

        let msg = from_json_str(&SHAPE, r#"{"circle": 1.0, "square": 2.0}"#).unwrap();
        assert_eq!(msg.which("kind").map(|f| f.number), Some(2));
        assert_eq!(msg.get(2), Some(&Value::F64(2.0)));
        assert!(!msg.has(1));
    }

    #[test]
    fn test_group_conflict_strict() {
        let json = json!({"circle": 1.0, "square": 2.0});
        let err = from_json_with(&SHAPE, &json, DecodeOptions::strict()).unwrap_err();
        assert!(matches!(
            err,
            ProtostubError::GroupConflict { group: "kind", .. }
        ));

        let single = from_json_with(&SHAPE, &json!({"square": 2.0}), DecodeOptions::strict());
        assert!(single.is_ok());
    }
}
