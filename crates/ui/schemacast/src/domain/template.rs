//! Placeholder documents for Avro schemas.
//!
//! `generate` walks a compiled schema depth-first and produces a JSON value
//! that the codec accepts for that schema. Field order follows the schema
//! (`serde_json` is built with `preserve_order`).
//!
//! Named types that are already being expanded on the current path render
//! as `null`, so self-referential schemas terminate.

use std::collections::{HashMap, HashSet};

use apache_avro::schema::{Name, Namespace, RecordSchema, ResolvedSchema, Schema};
use serde_json::{Map, Value};

const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("schema references could not be resolved: {source}")]
    Resolve {
        #[source]
        source: apache_avro::Error,
    },
    #[error("unknown type reference `{name}`")]
    UnknownReference { name: String },
    #[error("failed to render template: {source}")]
    Render {
        #[source]
        source: serde_json::Error,
    },
}

/// Build a placeholder document for `schema`.
pub fn generate(schema: &Schema) -> Result<Value, TemplateError> {
    let resolved =
        ResolvedSchema::try_from(schema).map_err(|source| TemplateError::Resolve { source })?;
    let mut walker = Walker {
        names: resolved.get_names(),
        namespace: None,
        expanding: HashSet::new(),
    };
    walker.value_for(schema)
}

/// Same as [`generate`], rendered as two-space indented JSON.
pub fn generate_pretty(schema: &Schema) -> Result<String, TemplateError> {
    let value = generate(schema)?;
    serde_json::to_string_pretty(&value).map_err(|source| TemplateError::Render { source })
}

/// Definition behind a named type reference.
///
/// An unqualified name is looked up in the enclosing namespace first, then in
/// the null namespace.
pub(crate) fn lookup<'s>(
    names: &HashMap<Name, &'s Schema>,
    name: &Name,
    enclosing: &Namespace,
) -> Option<&'s Schema> {
    if let (None, Some(namespace)) = (&name.namespace, enclosing) {
        let qualified = Name {
            name: name.name.clone(),
            namespace: Some(namespace.clone()),
        };
        if let Some(found) = names.get(&qualified) {
            return Some(*found);
        }
    }
    names.get(name).copied()
}

struct Walker<'a> {
    names: &'a HashMap<Name, &'a Schema>,
    namespace: Namespace,
    expanding: HashSet<Name>,
}

impl<'a> Walker<'a> {
    fn value_for(&mut self, schema: &'a Schema) -> Result<Value, TemplateError> {
        let value = match schema {
            Schema::Null => Value::Null,
            Schema::Boolean => Value::Bool(false),
            Schema::Int | Schema::Long => Value::from(0),
            Schema::Float | Schema::Double => Value::from(0.0),
            Schema::String | Schema::Bytes => Value::String(String::new()),
            Schema::Array(_) => Value::Array(Vec::new()),
            Schema::Map(_) => Value::Object(Map::new()),
            Schema::Enum(inner) => Value::String(inner.symbols.first().cloned().unwrap_or_default()),
            Schema::Fixed(_) => Value::String(String::new()),
            Schema::Union(union) => match union.variants().iter().find(|v| !matches!(v, Schema::Null)) {
                Some(branch) => self.value_for(branch)?,
                None => Value::Null,
            },
            Schema::Record(record) => self.record(record)?,
            Schema::Ref { name } => self.reference(name)?,
            Schema::Uuid => Value::String(NIL_UUID.to_string()),
            Schema::Date
            | Schema::TimeMillis
            | Schema::TimeMicros
            | Schema::TimestampMillis
            | Schema::TimestampMicros
            | Schema::LocalTimestampMillis
            | Schema::LocalTimestampMicros => Value::from(0),
            // decimal, big-decimal, duration and anything newer
            #[allow(unreachable_patterns)]
            _ => Value::String(String::new()),
        };
        Ok(value)
    }

    fn record(&mut self, record: &'a RecordSchema) -> Result<Value, TemplateError> {
        if !self.expanding.insert(record.name.clone()) {
            return Ok(Value::Null);
        }
        let outer = std::mem::replace(&mut self.namespace, record.name.namespace.clone());
        let fields = self.fields(record);
        self.namespace = outer;
        self.expanding.remove(&record.name);
        fields
    }

    fn fields(&mut self, record: &'a RecordSchema) -> Result<Value, TemplateError> {
        let mut out = Map::with_capacity(record.fields.len());
        for field in &record.fields {
            let value = match &field.default {
                Some(default) => default.clone(),
                None => self.value_for(&field.schema)?,
            };
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Object(out))
    }

    fn reference(&mut self, name: &Name) -> Result<Value, TemplateError> {
        if self.expanding.contains(name) {
            return Ok(Value::Null);
        }
        let definition = lookup(self.names, name, &self.namespace).ok_or_else(|| {
            TemplateError::UnknownReference {
                name: name.fullname(self.namespace.clone()),
            }
        })?;
        self.value_for(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template(raw: &str) -> Value {
        let schema = Schema::parse_str(raw).unwrap();
        generate(&schema).unwrap()
    }

    #[test]
    fn primitives_and_defaults() {
        let doc = template(
            r#"{
                "type": "record", "name": "User",
                "fields": [
                    {"name": "id", "type": "long"},
                    {"name": "name", "type": "string"},
                    {"name": "active", "type": "boolean"},
                    {"name": "score", "type": "double"},
                    {"name": "country", "type": "string", "default": "DE"}
                ]
            }"#,
        );
        assert_eq!(
            doc,
            json!({"id": 0, "name": "", "active": false, "score": 0.0, "country": "DE"})
        );
    }

    #[test]
    fn field_order_follows_schema() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "zeta", "type": "int"},
                {"name": "alpha", "type": "int"}
            ]}"#,
        )
        .unwrap();
        let rendered = generate_pretty(&schema).unwrap();
        assert_eq!(rendered, "{\n  \"zeta\": 0,\n  \"alpha\": 0\n}");
    }

    #[test]
    fn union_takes_first_non_null_branch() {
        assert_eq!(template(r#"["null", "string"]"#), json!(""));
        assert_eq!(template(r#"["null", "int", "string"]"#), json!(0));
        assert_eq!(template(r#"["null"]"#), Value::Null);
    }

    #[test]
    fn enum_uses_first_symbol() {
        let doc = template(r#"{"type": "enum", "name": "E", "symbols": ["A", "B", "C"]}"#);
        assert_eq!(doc, json!("A"));
    }

    #[test]
    fn collections_are_empty() {
        let doc = template(
            r#"{"type": "record", "name": "C", "fields": [
                {"name": "tags", "type": {"type": "array", "items": "string"}},
                {"name": "attrs", "type": {"type": "map", "values": "long"}},
                {"name": "hash", "type": {"type": "fixed", "name": "H", "size": 4}}
            ]}"#,
        );
        assert_eq!(doc, json!({"tags": [], "attrs": {}, "hash": ""}));
    }

    #[test]
    fn self_reference_terminates() {
        let doc = template(
            r#"{"type": "record", "name": "Node", "fields": [
                {"name": "value", "type": "int"},
                {"name": "next", "type": ["null", "Node"]}
            ]}"#,
        );
        assert_eq!(doc, json!({"value": 0, "next": null}));
    }

    #[test]
    fn named_type_reused_by_siblings_is_expanded_twice() {
        let doc = template(
            r#"{"type": "record", "name": "Outer", "namespace": "com.example", "fields": [
                {"name": "home", "type": {"type": "record", "name": "Address", "fields": [
                    {"name": "city", "type": "string"}
                ]}},
                {"name": "work", "type": "Address"}
            ]}"#,
        );
        assert_eq!(doc, json!({"home": {"city": ""}, "work": {"city": ""}}));
    }

    #[test]
    fn unqualified_reference_prefers_enclosing_namespace() {
        let billing = Schema::Int;
        let shipping = Schema::String;
        let names: HashMap<Name, &Schema> = [
            (Name::new("billing.Address").unwrap(), &billing),
            (Name::new("shipping.Address").unwrap(), &shipping),
        ]
        .into_iter()
        .collect();
        let short = Name::new("Address").unwrap();

        for (namespace, expected) in [("shipping", json!("")), ("billing", json!(0))] {
            let mut walker = Walker {
                names: &names,
                namespace: Some(namespace.to_string()),
                expanding: HashSet::new(),
            };
            assert_eq!(walker.reference(&short).unwrap(), expected, "{namespace}");
        }

        let mut walker = Walker {
            names: &names,
            namespace: None,
            expanding: HashSet::new(),
        };
        assert!(matches!(
            walker.reference(&short),
            Err(TemplateError::UnknownReference { .. })
        ));
    }

    #[test]
    fn logical_types_get_placeholders() {
        let doc = template(
            r#"{"type": "record", "name": "L", "fields": [
                {"name": "id", "type": {"type": "string", "logicalType": "uuid"}},
                {"name": "day", "type": {"type": "int", "logicalType": "date"}},
                {"name": "at", "type": {"type": "long", "logicalType": "timestamp-millis"}}
            ]}"#,
        );
        assert_eq!(doc, json!({"id": NIL_UUID, "day": 0, "at": 0}));
    }
}
