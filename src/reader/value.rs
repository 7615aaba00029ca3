//! Decoded record values.

use std::sync::Arc;

use crate::schema::{FieldType, RecordSchema};

/// Represents a decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// Signed integer of any declared width
    Integer(i64),
    /// Unsigned integer of any declared width
    Unsigned(u64),
    /// Floating point value (4-byte reals are widened)
    Real(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Data(Vec<u8>),
    /// Nested record
    Record(Record),
    /// List items
    List(Vec<Value>),
}

impl Value {
    /// Numeric view used for comparisons across integer, unsigned and real.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed integer view, if the value fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Nested record view.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

/// A decoded record: named values in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(Arc<str>, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Build a record from `(name, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<Arc<str>>,
    {
        Self {
            fields: pairs.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Append a field.
    pub fn push(&mut self, name: Arc<str>, value: Value) {
        self.fields.push((name, value));
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a direct child value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Resolve a dotted path through nested records.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.as_record()?.get(segment)?;
        }
        Some(current)
    }

    /// Field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_ref())
    }

    /// Field values in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    /// Iterate `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }

    /// Consume the record into its `(name, value)` pairs.
    pub fn into_fields(self) -> Vec<(Arc<str>, Value)> {
        self.fields
    }

    /// Prune this record to the shape of `schema`.
    ///
    /// `schema` must list a subset of this record's fields in the same
    /// relative order, which holds for any projection of the schema the
    /// record was decoded with.
    pub fn project(self, schema: &RecordSchema) -> Record {
        let mut wanted = schema.fields.iter().peekable();
        let mut out = Vec::with_capacity(schema.fields.len());
        for (name, value) in self.fields {
            let Some(field) = wanted.peek() else {
                break;
            };
            if name.as_ref() == field.name {
                out.push((name, project_value(value, &field.field_type)));
                wanted.next();
            }
        }
        Record { fields: out }
    }
}

fn project_value(value: Value, field_type: &FieldType) -> Value {
    match (value, field_type) {
        (Value::Record(record), FieldType::Record(schema)) => Value::Record(record.project(schema)),
        (Value::List(items), FieldType::List(item_type)) if !item_type.is_scalar() => Value::List(
            items
                .into_iter()
                .map(|item| project_value(item, item_type))
                .collect(),
        ),
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, ProjectionSpec};

    fn sample() -> Record {
        Record::from_pairs([
            ("id", Value::Integer(7)),
            (
                "home",
                Value::Record(Record::from_pairs([
                    ("city", Value::String("Oslo".into())),
                    ("zip", Value::String("0150".into())),
                ])),
            ),
            ("age", Value::Unsigned(40)),
        ])
    }

    fn sample_schema() -> RecordSchema {
        RecordSchema::new(vec![
            FieldSchema::new("id", FieldType::Integer { size: 8 }),
            FieldSchema::new(
                "home",
                FieldType::Record(RecordSchema::new(vec![
                    FieldSchema::new("city", FieldType::String { fixed: None }),
                    FieldSchema::new("zip", FieldType::String { fixed: None }),
                ])),
            ),
            FieldSchema::new("age", FieldType::Unsigned { size: 1 }),
        ])
    }

    #[test]
    fn test_get_path() {
        let record = sample();
        assert_eq!(record.get_path("home.city").and_then(Value::as_str), Some("Oslo"));
        assert_eq!(record.get_path("age").and_then(Value::as_f64), Some(40.0));
        assert!(record.get_path("home.country").is_none());
        assert!(record.get_path("id.x").is_none());
    }

    #[test]
    fn test_project_prunes_in_order() {
        let projected_schema = crate::schema::project(
            &sample_schema(),
            &ProjectionSpec::parse("age,home.zip"),
        )
        .unwrap();
        let projected = sample().project(&projected_schema);
        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["home", "age"]);
        let home = projected.get("home").and_then(Value::as_record).unwrap();
        assert_eq!(home.names().collect::<Vec<_>>(), vec!["zip"]);
    }

    #[test]
    fn test_unsigned_to_i64_bounds() {
        assert_eq!(Value::Unsigned(5).as_i64(), Some(5));
        assert_eq!(Value::Unsigned(u64::MAX).as_i64(), None);
    }
}
