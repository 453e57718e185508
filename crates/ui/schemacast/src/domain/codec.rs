//! JSON <-> Avro binary, plus the registry wire envelope.
//!
//! Every message on the wire is `[0x00][schema id: u32 BE][avro datum]`.

use std::collections::HashMap;

use apache_avro::schema::{Name, Namespace, ResolvedSchema, UnionSchema};
use apache_avro::{from_avro_datum, to_avro_datum, types::Value as AvroValue, Schema};
use serde_json::{Number, Value};

use crate::domain::template;

pub const MAGIC_BYTE: u8 = 0x00;
pub const ENVELOPE_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
    #[error("payload does not match schema: {source}")]
    Mismatch {
        #[source]
        source: apache_avro::Error,
    },
    #[error("payload does not match schema: {path}: {value} is out of range for {target}")]
    OutOfRange {
        path: String,
        value: Number,
        target: &'static str,
    },
    #[error("Avro error: {source}")]
    Avro {
        #[source]
        source: apache_avro::Error,
    },
    #[error("message is {len} bytes, shorter than the {ENVELOPE_LEN}-byte envelope")]
    Truncated { len: usize },
    #[error("unexpected magic byte 0x{found:02x}")]
    MagicByte { found: u8 },
}

/// Validate `text` against `schema` and encode it as a bare Avro datum.
pub fn encode(schema: &Schema, text: &str) -> Result<Vec<u8>, CodecError> {
    let json: Value = serde_json::from_str(text).map_err(|source| CodecError::Json { source })?;
    let resolved =
        ResolvedSchema::try_from(schema).map_err(|source| CodecError::Mismatch { source })?;
    IntRanges {
        names: resolved.get_names(),
        namespace: None,
    }
    .check(schema, &json, "payload")?;
    let value = AvroValue::from(json)
        .resolve(schema)
        .map_err(|source| CodecError::Mismatch { source })?;
    to_avro_datum(schema, value).map_err(|source| CodecError::Avro { source })
}

pub fn decode(schema: &Schema, bytes: &[u8]) -> Result<Value, CodecError> {
    let value = from_avro_datum(schema, &mut &bytes[..], None)
        .map_err(|source| CodecError::Avro { source })?;
    Value::try_from(value).map_err(|source| CodecError::Avro { source })
}

pub fn decode_pretty(schema: &Schema, bytes: &[u8]) -> Result<String, CodecError> {
    let value = decode(schema, bytes)?;
    serde_json::to_string_pretty(&value).map_err(|source| CodecError::Json { source })
}

/// Integer range check ahead of `resolve`.
///
/// apache-avro narrows JSON integers into `int` with a wrapping cast and
/// reinterprets integers above `i64::MAX` as negative longs. Both are rejected
/// here, naming the offending location. Type mismatches are left to `resolve`.
struct IntRanges<'a> {
    names: &'a HashMap<Name, &'a Schema>,
    namespace: Namespace,
}

impl<'a> IntRanges<'a> {
    fn check(&mut self, schema: &'a Schema, value: &Value, path: &str) -> Result<(), CodecError> {
        match (schema, value) {
            (Schema::Ref { name }, _) => match template::lookup(self.names, name, &self.namespace) {
                Some(definition) => self.check(definition, value, path),
                None => Ok(()),
            },
            (Schema::Int | Schema::Date | Schema::TimeMillis, Value::Number(n)) => {
                let fits = n.is_f64() || n.as_i64().is_some_and(|v| i32::try_from(v).is_ok());
                in_range(fits, path, n, "int")
            }
            (
                Schema::Long
                | Schema::TimeMicros
                | Schema::TimestampMillis
                | Schema::TimestampMicros
                | Schema::LocalTimestampMillis
                | Schema::LocalTimestampMicros,
                Value::Number(n),
            ) => in_range(n.is_f64() || n.is_i64(), path, n, "long"),
            (Schema::Union(union), _) => match self.branch(union, value) {
                Some(branch) => self.check(branch, value, path),
                None => Ok(()),
            },
            (Schema::Record(record), Value::Object(fields)) => {
                let outer = std::mem::replace(&mut self.namespace, record.name.namespace.clone());
                let result = record.fields.iter().try_for_each(|field| match fields.get(&field.name) {
                    Some(v) => self.check(&field.schema, v, &format!("{path}.{}", field.name)),
                    None => Ok(()),
                });
                self.namespace = outer;
                result
            }
            (Schema::Array(array), Value::Array(items)) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| self.check(&array.items, item, &format!("{path}[{i}]"))),
            (Schema::Map(map), Value::Object(entries)) => entries
                .iter()
                .try_for_each(|(key, v)| self.check(&map.types, v, &format!("{path}.{key}"))),
            _ => Ok(()),
        }
    }

    /// The branch `resolve` would pick for `value`.
    ///
    /// An exact kind match wins (`long` for a wide integer, `map` for an
    /// object); otherwise the first compatible branch in declaration order.
    fn branch(&self, union: &'a UnionSchema, value: &Value) -> Option<&'a Schema> {
        let variants: Vec<&'a Schema> = union
            .variants()
            .iter()
            .filter_map(|variant| match variant {
                Schema::Ref { name } => template::lookup(self.names, name, &self.namespace),
                other => Some(other),
            })
            .collect();
        let exact = |wanted: fn(&Schema) -> bool| variants.iter().copied().find(|v| wanted(v));
        match value {
            Value::Number(n) if n.is_f64() => None,
            Value::Number(n) if n.as_i64().is_some_and(|v| i32::try_from(v).is_ok()) => None,
            Value::Number(_) => exact(|v| matches!(v, Schema::Long)).or_else(|| {
                exact(|v| {
                    matches!(
                        v,
                        Schema::Int
                            | Schema::Long
                            | Schema::Float
                            | Schema::Double
                            | Schema::Date
                            | Schema::TimeMillis
                            | Schema::TimeMicros
                            | Schema::TimestampMillis
                            | Schema::TimestampMicros
                            | Schema::LocalTimestampMillis
                            | Schema::LocalTimestampMicros
                    )
                })
            }),
            Value::Object(_) => exact(|v| matches!(v, Schema::Map(_)))
                .or_else(|| exact(|v| matches!(v, Schema::Record(_)))),
            Value::Array(_) => exact(|v| matches!(v, Schema::Array(_))),
            _ => None,
        }
    }
}

fn in_range(fits: bool, path: &str, n: &Number, target: &'static str) -> Result<(), CodecError> {
    if fits {
        Ok(())
    } else {
        Err(CodecError::OutOfRange {
            path: path.to_string(),
            value: n.clone(),
            target,
        })
    }
}

/// Prefix `payload` with the magic byte and the big-endian schema id.
pub fn wrap(schema_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    out.push(MAGIC_BYTE);
    out.extend_from_slice(&schema_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split an enveloped message into its schema id and the datum.
pub fn unwrap(bytes: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    if bytes.len() < ENVELOPE_LEN {
        return Err(CodecError::Truncated { len: bytes.len() });
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(CodecError::MagicByte { found: bytes[0] });
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((id, &bytes[ENVELOPE_LEN..]))
}

/// Validate and encode, then wrap for the wire.
pub fn encode_envelope(schema: &Schema, schema_id: u32, text: &str) -> Result<Vec<u8>, CodecError> {
    let datum = encode(schema, text)?;
    Ok(wrap(schema_id, &datum))
}

/// Unwrap and decode an enveloped message. Returns the schema id it was written with.
pub fn decode_envelope(schema: &Schema, bytes: &[u8]) -> Result<(u32, Value), CodecError> {
    let (id, datum) = unwrap(bytes)?;
    Ok((id, decode(schema, datum)?))
}

/// Human-readable rendering of a consumed message value.
///
/// Falls back to the raw bytes (lossy UTF-8, escape sequences stripped) when the
/// value is not an envelope for `schema`.
pub fn describe(schema: Option<&Schema>, expected_id: u32, bytes: &[u8]) -> String {
    let Some(schema) = schema else {
        return raw_text(bytes);
    };
    let rendered = unwrap(bytes).and_then(|(id, datum)| decode_pretty(schema, datum).map(|body| (id, body)));
    match rendered {
        Ok((id, body)) => {
            if id == expected_id {
                body
            } else {
                format!("(written with schema id {id})\n{body}")
            }
        }
        Err(err) => format!("<undecodable: {err}>\n{}", raw_text(bytes)),
    }
}

/// Lossy UTF-8 with terminal escape sequences removed.
pub fn raw_text(bytes: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(bytes);
    strip_ansi_escapes::strip_str(lossy.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const USER: &str = r#"{
        "type": "record", "name": "User",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "email", "type": ["null", "string"], "default": null},
            {"name": "role", "type": {"type": "enum", "name": "Role", "symbols": ["ADMIN", "GUEST"]}},
            {"name": "tags", "type": {"type": "array", "items": "string"}},
            {"name": "limits", "type": {"type": "map", "values": "int"}},
            {"name": "ratio", "type": "float"}
        ]
    }"#;

    fn user_schema() -> Schema {
        Schema::parse_str(USER).unwrap()
    }

    #[test]
    fn template_is_accepted_by_encoder() {
        let schema = user_schema();
        let text = template::generate_pretty(&schema).unwrap();
        let bytes = encode(&schema, &text).unwrap();
        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(
            decoded,
            json!({"id": 0, "email": null, "role": "ADMIN", "tags": [], "limits": {}, "ratio": 0.0})
        );
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = encode(&user_schema(), "{ not json").unwrap_err();
        assert!(matches!(err, CodecError::Json { .. }));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let err = encode(&user_schema(), r#"{"id": "seven"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Mismatch { .. }), "{err}");
    }

    #[test]
    fn int_overflow_is_rejected_not_truncated() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "Counter", "fields": [
                {"name": "n", "type": "int"},
                {"name": "total", "type": "long"}
            ]}"#,
        )
        .unwrap();
        let err = encode(&schema, r#"{"n": 4294967297, "total": 1}"#).unwrap_err();
        assert!(
            matches!(&err, CodecError::OutOfRange { path, target: "int", .. } if path == "payload.n"),
            "{err}"
        );
        assert!(encode(&schema, r#"{"n": -2147483649, "total": 1}"#).is_err());

        let err = encode(&schema, r#"{"n": 1, "total": 18446744073709551615}"#).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { target: "long", .. }), "{err}");

        let wide = Schema::parse_str(r#"["null", "int", "long"]"#).unwrap();
        assert!(encode(&wide, "4294967297").is_ok());
        let narrow = Schema::parse_str(r#"["null", "int", "string"]"#).unwrap();
        assert!(matches!(
            encode(&narrow, "4294967297"),
            Err(CodecError::OutOfRange { target: "int", .. })
        ));

        let bytes = encode(&schema, r#"{"n": 2147483647, "total": 4294967297}"#).unwrap();
        assert_eq!(
            decode(&schema, &bytes).unwrap(),
            json!({"n": 2147483647, "total": 4294967297_i64})
        );
    }

    #[test]
    fn int_overflow_is_found_in_nested_values() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "Batch", "namespace": "acme", "fields": [
                {"name": "sizes", "type": {"type": "array", "items": "int"}},
                {"name": "limits", "type": {"type": "map", "values": "int"}},
                {"name": "day", "type": ["null", {"type": "int", "logicalType": "date"}]},
                {"name": "child", "type": ["null", {"type": "record", "name": "Item", "fields": [
                    {"name": "qty", "type": "int"}
                ]}]},
                {"name": "sibling", "type": ["null", "Item"]}
            ]}"#,
        )
        .unwrap();
        let ok = r#"{"sizes": [1, 2147483647], "limits": {"a": -2147483648}, "day": null, "child": null, "sibling": null}"#;
        assert!(encode(&schema, ok).is_ok());

        for (text, at) in [
            (r#"{"sizes": [1, 3000000000], "limits": {}, "day": null, "child": null, "sibling": null}"#, "payload.sizes[1]"),
            (r#"{"sizes": [], "limits": {"a": 3000000000}, "day": null, "child": null, "sibling": null}"#, "payload.limits.a"),
            (r#"{"sizes": [], "limits": {}, "day": 3000000000, "child": null, "sibling": null}"#, "payload.day"),
            (r#"{"sizes": [], "limits": {}, "day": null, "child": {"qty": 3000000000}, "sibling": null}"#, "payload.child.qty"),
            (r#"{"sizes": [], "limits": {}, "day": null, "child": null, "sibling": {"qty": 3000000000}}"#, "payload.sibling.qty"),
        ] {
            match encode(&schema, text) {
                Err(CodecError::OutOfRange { path, .. }) => assert_eq!(path, at),
                other => panic!("expected out-of-range at {at}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_enum_symbol_is_rejected() {
        let text = r#"{"id": 1, "email": null, "role": "ROOT", "tags": [], "limits": {}, "ratio": 1.5}"#;
        assert!(encode(&user_schema(), text).is_err());
    }

    #[test]
    fn wrap_prefixes_magic_byte_and_big_endian_id() {
        assert_eq!(wrap(5, &[1, 2, 3]), vec![0, 0, 0, 0, 5, 1, 2, 3]);
        assert_eq!(wrap(0x0102_0304, &[]), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unwrap_strips_envelope() {
        let bytes = wrap(5, &[1, 2, 3]);
        let (id, datum) = unwrap(&bytes).unwrap();
        assert_eq!(id, 5);
        assert_eq!(datum, &[1, 2, 3]);
    }

    #[test]
    fn unwrap_rejects_short_and_foreign_messages() {
        assert!(matches!(unwrap(&[0, 0, 1]), Err(CodecError::Truncated { len: 3 })));
        assert!(matches!(
            unwrap(&[7, 0, 0, 0, 1, 9]),
            Err(CodecError::MagicByte { found: 7 })
        ));
    }

    #[test]
    fn describe_falls_back_to_raw_text() {
        let schema = user_schema();
        let rendered = describe(Some(&schema), 1, b"plain \x1b[31mtext");
        assert!(rendered.starts_with("<undecodable:"));
        assert!(rendered.ends_with("plain text"));
    }

    #[test]
    fn describe_notes_foreign_schema_id() {
        let schema = Schema::parse_str(r#""string""#).unwrap();
        let bytes = encode_envelope(&schema, 9, r#""hi""#).unwrap();
        assert_eq!(describe(Some(&schema), 9, &bytes), "\"hi\"");
        assert_eq!(
            describe(Some(&schema), 3, &bytes),
            "(written with schema id 9)\n\"hi\""
        );
    }
}
