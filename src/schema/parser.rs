//! JSON schema parser for record layouts.
//!
//! Parses the record description returned by the metadata service into the
//! `RecordSchema` type hierarchy.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::schema::{FieldSchema, FieldType, RecordSchema};

/// Default byte width of integer, unsigned and real fields.
pub const DEFAULT_NUMERIC_SIZE: usize = 8;

/// Parse a record layout from a JSON string.
///
/// # Example
/// ```
/// use clusterfile::schema::parse_schema;
///
/// let schema = parse_schema(r#"{"fields": [{"name": "id", "type": "integer"}]}"#).unwrap();
/// assert_eq!(schema.fields.len(), 1);
/// ```
pub fn parse_schema(json: &str) -> Result<RecordSchema, SchemaError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SchemaError::MalformedSchema(format!("Invalid JSON: {}", e)))?;
    parse_schema_value(&value)
}

/// Parse a record layout from an already decoded JSON value.
///
/// A JSON string value is accepted as well and parsed as embedded JSON,
/// since services commonly ship the description as a quoted document.
pub fn parse_schema_value(value: &Value) -> Result<RecordSchema, SchemaError> {
    match value {
        Value::String(embedded) => parse_schema(embedded),
        Value::Object(obj) => {
            let types = match obj.get("types") {
                None => Map::new(),
                Some(Value::Object(types)) => types.clone(),
                Some(other) => {
                    return Err(SchemaError::MalformedSchema(format!(
                        "'types' must be an object, found: {}",
                        other
                    )))
                }
            };
            let mut parser = SchemaParser::new(types);
            parser.parse_root(obj)
        }
        other => Err(SchemaError::MalformedSchema(format!(
            "Expected a record object, found: {}",
            other
        ))),
    }
}

/// Schema parser with a named type table.
///
/// Named types are resolved on first use; a name referenced while it is still
/// being resolved is a cycle.
#[derive(Debug, Default)]
pub struct SchemaParser {
    /// Raw definitions from the top-level `types` table
    definitions: Map<String, Value>,
    /// Definitions already resolved
    resolved: HashMap<String, FieldType>,
    /// Names currently being resolved, in order
    resolving: Vec<String>,
}

impl SchemaParser {
    /// Create a parser over the given named type definitions.
    pub fn new(definitions: Map<String, Value>) -> Self {
        Self {
            definitions,
            resolved: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Parse the top-level record object.
    pub fn parse_root(&mut self, obj: &Map<String, Value>) -> Result<RecordSchema, SchemaError> {
        if let Some(type_value) = obj.get("type") {
            if type_value.as_str() != Some("record") {
                return Err(SchemaError::MalformedSchema(format!(
                    "Top-level schema must be a record, found type {}",
                    type_value
                )));
            }
        }
        let mut record = self.parse_record_fields(obj, "<root>")?;
        record.name = obj.get("name").and_then(|v| v.as_str()).map(String::from);
        Ok(record)
    }

    /// Parse a type specification.
    ///
    /// `attrs` is the object carrying type attributes (`size`, `fields`,
    /// `items`); for a field declared as `{"name": .., "type": "string",
    /// "size": 4}` that is the field object itself.
    fn parse_type(
        &mut self,
        spec: &Value,
        attrs: Option<&Map<String, Value>>,
        context: &str,
    ) -> Result<FieldType, SchemaError> {
        match spec {
            Value::String(tag) => self.parse_tag(tag, attrs, context),
            Value::Object(obj) => {
                let tag = obj.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
                    SchemaError::MalformedSchema(format!("{}: missing 'type'", context))
                })?;
                self.parse_tag(tag, Some(obj), context)
            }
            other => Err(SchemaError::MalformedSchema(format!(
                "{}: expected type name or object, found: {}",
                context, other
            ))),
        }
    }

    fn parse_tag(
        &mut self,
        tag: &str,
        attrs: Option<&Map<String, Value>>,
        context: &str,
    ) -> Result<FieldType, SchemaError> {
        let size = attrs.map(|a| parse_size(a, context)).transpose()?.flatten();
        match tag {
            "boolean" => Ok(FieldType::Boolean),
            "integer" => Ok(FieldType::Integer {
                size: integer_size(size, context)?,
            }),
            "unsigned" => Ok(FieldType::Unsigned {
                size: integer_size(size, context)?,
            }),
            "real" => match size.unwrap_or(DEFAULT_NUMERIC_SIZE) {
                n @ (4 | 8) => Ok(FieldType::Real { size: n }),
                n => Err(SchemaError::MalformedSchema(format!(
                    "{}: real size must be 4 or 8, found {}",
                    context, n
                ))),
            },
            "string" => Ok(FieldType::String { fixed: size }),
            "data" => Ok(FieldType::Data { fixed: size }),
            "record" => {
                let obj = attrs.ok_or_else(|| {
                    SchemaError::MalformedSchema(format!("{}: record missing 'fields'", context))
                })?;
                Ok(FieldType::Record(self.parse_record_fields(obj, context)?))
            }
            "list" => {
                let items = attrs.and_then(|a| a.get("items")).ok_or_else(|| {
                    SchemaError::MalformedSchema(format!("{}: list missing 'items'", context))
                })?;
                let item_type = self.parse_type(items, None, &format!("{}[]", context))?;
                Ok(FieldType::List(Box::new(item_type)))
            }
            name => self.resolve_named(name, context),
        }
    }

    fn parse_record_fields(
        &mut self,
        obj: &Map<String, Value>,
        context: &str,
    ) -> Result<RecordSchema, SchemaError> {
        let fields_value = obj.get("fields").and_then(|v| v.as_array()).ok_or_else(|| {
            SchemaError::MalformedSchema(format!("{}: record missing 'fields' array", context))
        })?;

        if fields_value.is_empty() {
            return Err(SchemaError::MalformedSchema(format!(
                "{}: record must declare at least one field",
                context
            )));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(fields_value.len());
        for value in fields_value {
            let field = self.parse_field(value, context)?;
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::MalformedSchema(format!(
                    "{}: duplicate field name '{}'",
                    context, field.name
                )));
            }
            fields.push(field);
        }

        Ok(RecordSchema { name: None, fields })
    }

    /// Parse a field object within a record.
    fn parse_field(&mut self, value: &Value, context: &str) -> Result<FieldSchema, SchemaError> {
        let obj = value.as_object().ok_or_else(|| {
            SchemaError::MalformedSchema(format!("{}: field must be an object", context))
        })?;

        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::MalformedSchema(format!("{}: field missing 'name'", context)))?;
        validate_name(name, context)?;

        let path = if context == "<root>" {
            name.to_string()
        } else {
            format!("{}.{}", context, name)
        };

        let type_value = obj
            .get("type")
            .ok_or_else(|| SchemaError::MalformedSchema(format!("{}: field missing 'type'", path)))?;

        let field_type = self.parse_type(type_value, Some(obj), &path)?;
        Ok(FieldSchema::new(name, field_type))
    }

    /// Resolve a reference into the `types` table.
    fn resolve_named(&mut self, name: &str, context: &str) -> Result<FieldType, SchemaError> {
        if let Some(resolved) = self.resolved.get(name) {
            return Ok(resolved.clone());
        }
        if self.resolving.iter().any(|n| n == name) {
            return Err(SchemaError::MalformedSchema(format!(
                "Cyclic type reference: {} -> {}",
                self.resolving.join(" -> "),
                name
            )));
        }
        let definition = self.definitions.get(name).cloned().ok_or_else(|| {
            SchemaError::MalformedSchema(format!("{}: unknown type '{}'", context, name))
        })?;

        self.resolving.push(name.to_string());
        let attrs = definition.as_object().cloned();
        let result = self.parse_type(&definition, attrs.as_ref(), name);
        self.resolving.pop();

        let field_type = result?;
        self.resolved.insert(name.to_string(), field_type.clone());
        Ok(field_type)
    }
}

fn parse_size(attrs: &Map<String, Value>, context: &str) -> Result<Option<usize>, SchemaError> {
    match attrs.get("size") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(0) | None => Err(SchemaError::MalformedSchema(format!(
                "{}: size must be a positive integer, found {}",
                context, value
            ))),
            Some(n) => Ok(Some(n as usize)),
        },
    }
}

fn integer_size(size: Option<usize>, context: &str) -> Result<usize, SchemaError> {
    match size.unwrap_or(DEFAULT_NUMERIC_SIZE) {
        n @ 1..=8 => Ok(n),
        n => Err(SchemaError::MalformedSchema(format!(
            "{}: integer size must be between 1 and 8, found {}",
            context, n
        ))),
    }
}

/// Field names must be non-empty and must not contain the path separator.
fn validate_name(name: &str, context: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::MalformedSchema(format!(
            "{}: field name cannot be empty",
            context
        )));
    }
    if name.contains('.') {
        return Err(SchemaError::MalformedSchema(format!(
            "{}: field name '{}' cannot contain '.'",
            context, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars_with_defaults() {
        let schema = parse_schema(
            r#"{"name": "t", "fields": [
                {"name": "a", "type": "integer"},
                {"name": "b", "type": "unsigned", "size": 2},
                {"name": "c", "type": "real", "size": 4},
                {"name": "d", "type": "string"},
                {"name": "e", "type": "string", "size": 3},
                {"name": "f", "type": "boolean"},
                {"name": "g", "type": {"type": "data", "size": 16}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(schema.name.as_deref(), Some("t"));
        let types: Vec<_> = schema.fields.iter().map(|f| f.field_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                FieldType::Integer { size: 8 },
                FieldType::Unsigned { size: 2 },
                FieldType::Real { size: 4 },
                FieldType::String { fixed: None },
                FieldType::String { fixed: Some(3) },
                FieldType::Boolean,
                FieldType::Data { fixed: Some(16) },
            ]
        );
    }

    #[test]
    fn test_parse_nested_record_and_list() {
        let schema = parse_schema(
            r#"{"fields": [
                {"name": "home", "type": "record", "fields": [{"name": "city", "type": "string"}]},
                {"name": "tags", "type": "list", "items": "string"},
                {"name": "orders", "type": "list", "items": {"type": "record", "fields": [
                    {"name": "amount", "type": "real"}
                ]}}
            ]}"#,
        )
        .unwrap();

        assert!(matches!(schema.fields[0].field_type, FieldType::Record(_)));
        assert_eq!(
            schema.fields[1].field_type,
            FieldType::List(Box::new(FieldType::String { fixed: None }))
        );
        assert!(schema.lookup("orders.amount").is_some());
    }

    #[test]
    fn test_named_types_resolve() {
        let schema = parse_schema(
            r#"{"fields": [
                    {"name": "home", "type": "address_t"},
                    {"name": "work", "type": "address_t"}
                ],
                "types": {"address_t": {"type": "record", "fields": [
                    {"name": "zip", "type": "zip_t"}
                ]}, "zip_t": {"type": "string", "size": 5}}}"#,
        )
        .unwrap();

        assert_eq!(schema.fields[0].field_type, schema.fields[1].field_type);
        assert_eq!(
            schema.lookup("work.zip").map(|f| &f.field_type),
            Some(&FieldType::String { fixed: Some(5) })
        );
    }

    #[test]
    fn test_cyclic_named_types_rejected() {
        let err = parse_schema(
            r#"{"fields": [{"name": "node", "type": "a"}],
                "types": {
                    "a": {"type": "record", "fields": [{"name": "next", "type": "b"}]},
                    "b": {"type": "list", "items": "a"}
                }}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedSchema(ref m) if m.contains("Cyclic")));
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let err = parse_schema(
            r#"{"fields": [{"name": "a", "type": "integer"}, {"name": "a", "type": "string"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedSchema(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_same_name_in_different_scopes_allowed() {
        let schema = parse_schema(
            r#"{"fields": [
                {"name": "id", "type": "integer"},
                {"name": "inner", "type": "record", "fields": [{"name": "id", "type": "integer"}]}
            ]}"#,
        );
        assert!(schema.is_ok());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = parse_schema(r#"{"fields": [{"name": "a", "type": "varint"}]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::MalformedSchema(ref m) if m.contains("unknown type")));
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert!(parse_schema(r#"{"fields": [{"name": "a", "type": "integer", "size": 9}]}"#).is_err());
        assert!(parse_schema(r#"{"fields": [{"name": "a", "type": "real", "size": 2}]}"#).is_err());
        assert!(parse_schema(r#"{"fields": [{"name": "a", "type": "string", "size": 0}]}"#).is_err());
    }

    #[test]
    fn test_structural_errors() {
        assert!(parse_schema("not json").is_err());
        assert!(parse_schema("[1, 2]").is_err());
        assert!(parse_schema(r#"{"fields": []}"#).is_err());
        assert!(parse_schema(r#"{"fields": [{"type": "integer"}]}"#).is_err());
        assert!(parse_schema(r#"{"fields": [{"name": "a"}]}"#).is_err());
        assert!(parse_schema(r#"{"fields": [{"name": "a.b", "type": "integer"}]}"#).is_err());
        assert!(parse_schema(r#"{"type": "list", "fields": []}"#).is_err());
    }

    #[test]
    fn test_embedded_json_string() {
        let value = Value::String(r#"{"fields": [{"name": "a", "type": "boolean"}]}"#.to_string());
        let schema = parse_schema_value(&value).unwrap();
        assert_eq!(schema.fields[0].field_type, FieldType::Boolean);
    }

    #[test]
    fn test_json_round_trip() {
        let original = parse_schema(
            r#"{"name": "p", "fields": [
                {"name": "id", "type": "integer", "size": 4},
                {"name": "code", "type": "string", "size": 2},
                {"name": "home", "type": "record", "fields": [{"name": "city", "type": "string"}]},
                {"name": "tags", "type": "list", "items": "string"}
            ]}"#,
        )
        .unwrap();
        let reparsed = parse_schema(&original.to_json()).unwrap();
        assert_eq!(original, reparsed);
    }
}
