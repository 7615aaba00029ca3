//! Binary row decoder for scalar and nested field types.
//!
//! Rows follow a fixed little-endian layout:
//! - Booleans are a single byte, integers and reals use their declared width
//! - Variable-length strings and data carry a u32 length prefix
//! - Fixed-length strings are space padded to their declared width
//! - Nested records are stored inline, lists carry a u32 byte-length prefix
//!
//! All decoders take a `&mut &[u8]` cursor and advance it past the value.
//! `DecodeError::UnexpectedEof` always means the cursor ran out of bytes, so a
//! streaming caller can fetch more input and retry; overruns inside a
//! length-delimited region are reported as `InvalidData` instead.

use std::sync::Arc;

use crate::error::DecodeError;
use crate::schema::{FieldType, RecordSchema};

use super::value::{Record, Value};

/// Take `len` bytes from the cursor.
#[inline]
fn take<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8], DecodeError> {
    if data.len() < len {
        return Err(DecodeError::UnexpectedEof);
    }
    let (head, tail) = data.split_at(len);
    *data = tail;
    Ok(head)
}

/// Decode a u32 length prefix.
#[inline]
pub fn decode_length(data: &mut &[u8]) -> Result<usize, DecodeError> {
    let bytes = take(data, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}

/// Decode a boolean value.
///
/// Booleans are encoded as a single byte: 0x00 for false, 0x01 for true.
#[inline]
pub fn decode_boolean(data: &mut &[u8]) -> Result<bool, DecodeError> {
    let byte = take(data, 1)?[0];
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DecodeError::InvalidData(format!(
            "Invalid boolean value: {}, expected 0 or 1",
            byte
        ))),
    }
}

/// Decode a signed little-endian integer of `size` bytes, sign-extended.
#[inline]
pub fn decode_integer(data: &mut &[u8], size: usize) -> Result<i64, DecodeError> {
    let bytes = take(data, size)?;
    let negative = bytes[size - 1] & 0x80 != 0;
    let mut buf = if negative { [0xFF; 8] } else { [0u8; 8] };
    buf[..size].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

/// Decode an unsigned little-endian integer of `size` bytes.
#[inline]
pub fn decode_unsigned(data: &mut &[u8], size: usize) -> Result<u64, DecodeError> {
    let bytes = take(data, size)?;
    let mut buf = [0u8; 8];
    buf[..size].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Decode an IEEE 754 value of 4 or 8 bytes, widened to f64.
#[inline]
pub fn decode_real(data: &mut &[u8], size: usize) -> Result<f64, DecodeError> {
    match size {
        4 => {
            let b = take(data, 4)?;
            Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
        }
        8 => {
            let b = take(data, 8)?;
            Ok(f64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        }
        other => Err(DecodeError::InvalidData(format!(
            "Unsupported real width: {}",
            other
        ))),
    }
}

/// Decode raw bytes, fixed width or length-prefixed.
#[inline]
pub fn decode_data(data: &mut &[u8], fixed: Option<usize>) -> Result<Vec<u8>, DecodeError> {
    let len = match fixed {
        Some(n) => n,
        None => decode_length(data)?,
    };
    Ok(take(data, len)?.to_vec())
}

/// Decode a UTF-8 string.
///
/// Fixed-width strings have their trailing space padding removed.
#[inline]
pub fn decode_string(data: &mut &[u8], fixed: Option<usize>) -> Result<String, DecodeError> {
    let bytes = match fixed {
        Some(n) => {
            let raw = take(data, n)?;
            let end = raw.iter().rposition(|b| *b != b' ').map_or(0, |p| p + 1);
            &raw[..end]
        }
        None => {
            let len = decode_length(data)?;
            take(data, len)?
        }
    };
    String::from_utf8(bytes.to_vec()).map_err(DecodeError::from)
}

/// Decode list items from a byte-length-prefixed region.
pub fn decode_list(data: &mut &[u8], item_type: &FieldType) -> Result<Vec<Value>, DecodeError> {
    let len = decode_length(data)?;
    let mut region = take(data, len)?;
    let mut items = Vec::new();
    while !region.is_empty() {
        let item = decode_value(&mut region, item_type).map_err(inside_region("list"))?;
        items.push(item);
    }
    Ok(items)
}

/// Decode all fields of a record.
pub fn decode_record(data: &mut &[u8], schema: &RecordSchema) -> Result<Record, DecodeError> {
    let mut record = Record::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let value = decode_value(data, &field.field_type)?;
        record.push(Arc::from(field.name.as_str()), value);
    }
    Ok(record)
}

/// Decode a value of any field type.
pub fn decode_value(data: &mut &[u8], field_type: &FieldType) -> Result<Value, DecodeError> {
    match field_type {
        FieldType::Boolean => decode_boolean(data).map(Value::Boolean),
        FieldType::Integer { size } => decode_integer(data, *size).map(Value::Integer),
        FieldType::Unsigned { size } => decode_unsigned(data, *size).map(Value::Unsigned),
        FieldType::Real { size } => decode_real(data, *size).map(Value::Real),
        FieldType::String { fixed } => decode_string(data, *fixed).map(Value::String),
        FieldType::Data { fixed } => decode_data(data, *fixed).map(Value::Data),
        FieldType::Record(schema) => decode_record(data, schema).map(Value::Record),
        FieldType::List(items) => decode_list(data, items).map(Value::List),
    }
}

/// Skip over a value without materializing it.
pub fn skip_value(data: &mut &[u8], field_type: &FieldType) -> Result<(), DecodeError> {
    if let Some(width) = field_type.fixed_width() {
        take(data, width)?;
        return Ok(());
    }
    match field_type {
        FieldType::String { fixed: None } | FieldType::Data { fixed: None } | FieldType::List(_) => {
            let len = decode_length(data)?;
            take(data, len)?;
            Ok(())
        }
        FieldType::Record(schema) => {
            for field in &schema.fields {
                skip_value(data, &field.field_type)?;
            }
            Ok(())
        }
        // Every other type has a fixed width
        _ => Ok(()),
    }
}

/// Convert a cursor underrun inside a length-delimited region into corruption.
fn inside_region(what: &'static str) -> impl Fn(DecodeError) -> DecodeError {
    move |err| match err {
        DecodeError::UnexpectedEof => {
            DecodeError::InvalidData(format!("{} item overruns its declared length", what))
        }
        other => other,
    }
}

// ============================================================================
// Decode Plans
// ============================================================================

/// How to handle one field while decoding.
#[derive(Debug, Clone)]
struct FieldPlan {
    name: Arc<str>,
    /// Full storage type, used to skip the field
    storage: FieldType,
    /// `None` skips the field
    plan: Option<TypePlan>,
}

#[derive(Debug, Clone)]
enum TypePlan {
    /// Decode the whole value
    Full,
    /// Decode selected fields of a nested record
    Record(RecordPlan),
    /// Decode list items with a nested plan
    List(Box<TypePlan>),
}

/// Precomputed decode plan for a record layout.
///
/// Built from the full storage schema and the sub-tree of it that must be
/// materialized. Fields outside that sub-tree are skipped without allocation.
#[derive(Debug, Clone)]
pub struct RecordPlan {
    fields: Vec<FieldPlan>,
}

impl RecordPlan {
    /// Plan decoding every field of `schema`.
    pub fn full(schema: &RecordSchema) -> Self {
        Self::new(schema, schema)
    }

    /// Plan decoding the fields of `needed`, a projection of `storage`.
    pub fn new(storage: &RecordSchema, needed: &RecordSchema) -> Self {
        let fields = storage
            .fields
            .iter()
            .map(|field| FieldPlan {
                name: Arc::from(field.name.as_str()),
                storage: field.field_type.clone(),
                plan: needed
                    .field(&field.name)
                    .map(|n| TypePlan::new(&field.field_type, &n.field_type)),
            })
            .collect();
        Self { fields }
    }

    /// Number of fields that will be materialized.
    pub fn decoded_fields(&self) -> usize {
        self.fields.iter().filter(|f| f.plan.is_some()).count()
    }

    /// Decode one record following this plan.
    pub fn decode(&self, data: &mut &[u8]) -> Result<Record, DecodeError> {
        let mut record = Record::with_capacity(self.decoded_fields());
        for field in &self.fields {
            match &field.plan {
                None => skip_value(data, &field.storage)?,
                Some(plan) => {
                    let value = plan.decode(data, &field.storage)?;
                    record.push(field.name.clone(), value);
                }
            }
        }
        Ok(record)
    }
}

impl TypePlan {
    fn new(storage: &FieldType, needed: &FieldType) -> Self {
        if storage == needed {
            return TypePlan::Full;
        }
        match (storage, needed) {
            (FieldType::Record(s), FieldType::Record(n)) => TypePlan::Record(RecordPlan::new(s, n)),
            (FieldType::List(s), FieldType::List(n)) => TypePlan::List(Box::new(TypePlan::new(s, n))),
            _ => TypePlan::Full,
        }
    }

    fn decode(&self, data: &mut &[u8], storage: &FieldType) -> Result<Value, DecodeError> {
        match (self, storage) {
            (TypePlan::Record(plan), FieldType::Record(_)) => plan.decode(data).map(Value::Record),
            (TypePlan::List(item_plan), FieldType::List(item_type)) => {
                let len = decode_length(data)?;
                let mut region = take(data, len)?;
                let mut items = Vec::new();
                while !region.is_empty() {
                    let item = item_plan
                        .decode(&mut region, item_type)
                        .map_err(inside_region("list"))?;
                    items.push(item);
                }
                Ok(Value::List(items))
            }
            _ => decode_value(data, storage),
        }
    }
}

/// Decode one entry of an index partition.
///
/// Index entries carry a u32 length prefix and the record must consume the
/// entry exactly.
pub fn decode_index_entry(data: &mut &[u8], plan: &RecordPlan) -> Result<Record, DecodeError> {
    let len = decode_length(data)?;
    let mut entry = take(data, len)?;
    let record = plan.decode(&mut entry).map_err(inside_region("index entry"))?;
    if !entry.is_empty() {
        return Err(DecodeError::InvalidData(format!(
            "Index entry has {} trailing bytes",
            entry.len()
        )));
    }
    Ok(record)
}
