//! Record layout types.
//!
//! This module defines the typed field tree describing the binary row layout
//! of a logical file: scalar kinds, nested records and lists.

use serde_json::{json, Map, Value};

/// Type of a single field in the row layout.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Single byte, 0 or 1.
    Boolean,
    /// Signed little-endian integer of `size` bytes (1..=8).
    Integer { size: usize },
    /// Unsigned little-endian integer of `size` bytes (1..=8).
    Unsigned { size: usize },
    /// IEEE 754 floating point of `size` bytes (4 or 8).
    Real { size: usize },
    /// UTF-8 text, fixed width (space padded) or length-prefixed.
    String { fixed: Option<usize> },
    /// Raw bytes, fixed width or length-prefixed.
    Data { fixed: Option<usize> },
    /// Nested record stored inline.
    Record(RecordSchema),
    /// Byte-length-prefixed sequence of items.
    List(Box<FieldType>),
}

impl FieldType {
    /// Check if this is a scalar (non-nested) type.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Record(_) | FieldType::List(_))
    }

    /// Encoded width in bytes when the type has a fixed size.
    ///
    /// Returns `None` for variable-length types and for records or lists
    /// containing one.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            FieldType::Boolean => Some(1),
            FieldType::Integer { size } | FieldType::Unsigned { size } | FieldType::Real { size } => {
                Some(*size)
            }
            FieldType::String { fixed } | FieldType::Data { fixed } => *fixed,
            FieldType::Record(record) => record
                .fields
                .iter()
                .map(|f| f.field_type.fixed_width())
                .sum(),
            FieldType::List(_) => None,
        }
    }

    /// Type tag used in the JSON description.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer { .. } => "integer",
            FieldType::Unsigned { .. } => "unsigned",
            FieldType::Real { .. } => "real",
            FieldType::String { .. } => "string",
            FieldType::Data { .. } => "data",
            FieldType::Record(_) => "record",
            FieldType::List(_) => "list",
        }
    }

    /// The record schema reached through this type, looking through lists.
    pub fn as_record(&self) -> Option<&RecordSchema> {
        match self {
            FieldType::Record(record) => Some(record),
            FieldType::List(items) => items.as_record(),
            _ => None,
        }
    }

    /// Serialize the type to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        match self {
            FieldType::Boolean => json!("boolean"),
            FieldType::Integer { size } | FieldType::Unsigned { size } | FieldType::Real { size } => {
                json!({"type": self.tag(), "size": size})
            }
            FieldType::String { fixed } | FieldType::Data { fixed } => match fixed {
                Some(size) => json!({"type": self.tag(), "size": size}),
                None => json!(self.tag()),
            },
            FieldType::Record(record) => record.to_json_value(),
            FieldType::List(items) => json!({"type": "list", "items": items.to_json_value()}),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Integer { size } => write!(f, "integer{}", size),
            FieldType::Unsigned { size } => write!(f, "unsigned{}", size),
            FieldType::Real { size } => write!(f, "real{}", size),
            FieldType::String { fixed: Some(n) } => write!(f, "string{}", n),
            FieldType::String { fixed: None } => write!(f, "string"),
            FieldType::Data { fixed: Some(n) } => write!(f, "data{}", n),
            FieldType::Data { fixed: None } => write!(f, "data"),
            FieldType::Record(record) => write!(f, "record({} fields)", record.fields.len()),
            FieldType::List(items) => write!(f, "list<{}>", items),
        }
    }
}

/// Schema for a field within a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// The name of the field.
    pub name: String,
    /// The type of the field's value.
    pub field_type: FieldType,
}

impl FieldSchema {
    /// Create a new FieldSchema with the given name and type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Serialize the field schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!(&self.name));
        match self.field_type.to_json_value() {
            Value::Object(inner) => {
                for (key, value) in inner {
                    if key != "name" {
                        obj.insert(key, value);
                    }
                }
            }
            other => {
                obj.insert("type".to_string(), other);
            }
        }
        Value::Object(obj)
    }
}

/// Schema for a record: an ordered list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    /// Optional name of the record layout.
    pub name: Option<String>,
    /// The fields of the record, in storage order.
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    /// Create a new RecordSchema with the given fields.
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { name: None, fields }
    }

    /// The "unknown" sentinel: a record with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the record name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a direct child field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field position by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Resolve a dotted path to a field, descending through nested records
    /// and through the item record of lists.
    pub fn lookup(&self, path: &str) -> Option<&FieldSchema> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.field(first)?;
        for segment in segments {
            current = current.field_type.as_record()?.field(segment)?;
        }
        Some(current)
    }

    /// Whether the dotted path crosses a list on its way to the target field.
    pub fn path_crosses_list(&self, path: &str) -> bool {
        let mut record = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(field) = record.field(segment) else {
                return false;
            };
            if segments.peek().is_none() {
                return false;
            }
            match &field.field_type {
                FieldType::Record(inner) => record = inner,
                FieldType::List(_) => return true,
                _ => return false,
            }
        }
        false
    }

    /// Flatten the schema into leaf columns keyed by dotted path.
    ///
    /// Lists are reported as a single column; their items are not expanded.
    pub fn leaf_columns(&self) -> Vec<(String, FieldType)> {
        let mut columns = Vec::new();
        self.collect_leaves("", &mut columns);
        columns
    }

    fn collect_leaves(&self, prefix: &str, out: &mut Vec<(String, FieldType)>) {
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", prefix, field.name)
            };
            match &field.field_type {
                FieldType::Record(inner) => inner.collect_leaves(&path, out),
                other => out.push((path, other.clone())),
            }
        }
    }

    /// Serialize the record schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!("record"));
        if let Some(name) = &self.name {
            obj.insert("name".to_string(), json!(name));
        }
        let fields: Vec<Value> = self.fields.iter().map(|f| f.to_json_value()).collect();
        obj.insert("fields".to_string(), Value::Array(fields));
        Value::Object(obj)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> RecordSchema {
        RecordSchema::new(vec![
            FieldSchema::new("id", FieldType::Integer { size: 8 }),
            FieldSchema::new(
                "home",
                FieldType::Record(RecordSchema::new(vec![
                    FieldSchema::new("city", FieldType::String { fixed: None }),
                    FieldSchema::new("zip", FieldType::String { fixed: Some(5) }),
                ])),
            ),
            FieldSchema::new(
                "orders",
                FieldType::List(Box::new(FieldType::Record(RecordSchema::new(vec![
                    FieldSchema::new("amount", FieldType::Real { size: 8 }),
                ])))),
            ),
        ])
        .with_name("person")
    }

    #[test]
    fn test_lookup_nested_paths() {
        let schema = person();
        assert_eq!(
            schema.lookup("home.zip").map(|f| &f.field_type),
            Some(&FieldType::String { fixed: Some(5) })
        );
        assert!(schema.lookup("orders.amount").is_some());
        assert!(schema.lookup("home.street").is_none());
        assert!(schema.lookup("id.x").is_none());
    }

    #[test]
    fn test_path_crosses_list() {
        let schema = person();
        assert!(schema.path_crosses_list("orders.amount"));
        assert!(!schema.path_crosses_list("orders"));
        assert!(!schema.path_crosses_list("home.city"));
    }

    #[test]
    fn test_fixed_width() {
        let schema = person();
        assert_eq!(schema.fields[0].field_type.fixed_width(), Some(8));
        assert_eq!(schema.fields[1].field_type.fixed_width(), None);
        let fixed = FieldType::Record(RecordSchema::new(vec![
            FieldSchema::new("a", FieldType::Boolean),
            FieldSchema::new("b", FieldType::Unsigned { size: 2 }),
            FieldSchema::new("c", FieldType::Data { fixed: Some(3) }),
        ]));
        assert_eq!(fixed.fixed_width(), Some(6));
    }

    #[test]
    fn test_leaf_columns() {
        let columns: Vec<String> = person().leaf_columns().into_iter().map(|(p, _)| p).collect();
        assert_eq!(columns, vec!["id", "home.city", "home.zip", "orders"]);
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(RecordSchema::empty().is_empty());
        assert!(!person().is_empty());
    }
}
