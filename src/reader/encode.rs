//! Binary row encoder.
//!
//! Writes records in the layout read by [`super::decode`]. Data servers and
//! tests use it to produce partition bytes.

use crate::error::EncodeError;
use crate::schema::{FieldType, RecordSchema};

use super::value::{Record, Value};

/// Encode one record laid out by `schema`.
pub fn encode_record(schema: &RecordSchema, record: &Record) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    encode_record_into(&mut out, schema, record)?;
    Ok(out)
}

/// Append one record to `out`.
pub fn encode_record_into(
    out: &mut Vec<u8>,
    schema: &RecordSchema,
    record: &Record,
) -> Result<(), EncodeError> {
    for field in &schema.fields {
        let value = record
            .get(&field.name)
            .ok_or_else(|| EncodeError::MissingField(field.name.clone()))?;
        encode_value(out, &field.name, value, &field.field_type)?;
    }
    Ok(())
}

/// Append one index entry: a u32 length prefix followed by the record.
pub fn encode_index_entry_into(
    out: &mut Vec<u8>,
    schema: &RecordSchema,
    record: &Record,
) -> Result<(), EncodeError> {
    let body = encode_record(schema, record)?;
    encode_length(out, &schema_label(schema), body.len())?;
    out.extend_from_slice(&body);
    Ok(())
}

fn schema_label(schema: &RecordSchema) -> String {
    schema.name.clone().unwrap_or_else(|| "<record>".to_string())
}

fn encode_length(out: &mut Vec<u8>, field: &str, len: usize) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::OutOfRange {
        field: field.to_string(),
        message: format!("length {} exceeds u32", len),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn mismatch(field: &str, field_type: &FieldType) -> EncodeError {
    EncodeError::TypeMismatch {
        field: field.to_string(),
        expected: field_type.to_string(),
    }
}

/// Append a single value of `field_type`.
pub fn encode_value(
    out: &mut Vec<u8>,
    field: &str,
    value: &Value,
    field_type: &FieldType,
) -> Result<(), EncodeError> {
    match (field_type, value) {
        (FieldType::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),

        (FieldType::Integer { size }, v) => {
            let n = v.as_i64().ok_or_else(|| mismatch(field, field_type))?;
            let bits = (*size as u32) * 8;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if n < min || n > max {
                    return Err(EncodeError::OutOfRange {
                        field: field.to_string(),
                        message: format!("{} does not fit {} bytes", n, size),
                    });
                }
            }
            out.extend_from_slice(&n.to_le_bytes()[..*size]);
        }

        (FieldType::Unsigned { size }, v) => {
            let n = match v {
                Value::Unsigned(n) => *n,
                Value::Integer(n) if *n >= 0 => *n as u64,
                _ => return Err(mismatch(field, field_type)),
            };
            if *size < 8 && n >> (size * 8) != 0 {
                return Err(EncodeError::OutOfRange {
                    field: field.to_string(),
                    message: format!("{} does not fit {} bytes", n, size),
                });
            }
            out.extend_from_slice(&n.to_le_bytes()[..*size]);
        }

        (FieldType::Real { size }, v) => {
            let x = v.as_f64().ok_or_else(|| mismatch(field, field_type))?;
            if *size == 4 {
                out.extend_from_slice(&(x as f32).to_le_bytes());
            } else {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }

        (FieldType::String { fixed }, Value::String(s)) => match fixed {
            Some(width) => {
                if s.len() > *width {
                    return Err(EncodeError::OutOfRange {
                        field: field.to_string(),
                        message: format!("{} bytes exceed fixed width {}", s.len(), width),
                    });
                }
                out.extend_from_slice(s.as_bytes());
                out.resize(out.len() + (width - s.len()), b' ');
            }
            None => {
                encode_length(out, field, s.len())?;
                out.extend_from_slice(s.as_bytes());
            }
        },

        (FieldType::Data { fixed }, Value::Data(bytes)) => match fixed {
            Some(width) => {
                if bytes.len() != *width {
                    return Err(EncodeError::OutOfRange {
                        field: field.to_string(),
                        message: format!("{} bytes for fixed width {}", bytes.len(), width),
                    });
                }
                out.extend_from_slice(bytes);
            }
            None => {
                encode_length(out, field, bytes.len())?;
                out.extend_from_slice(bytes);
            }
        },

        (FieldType::Record(schema), Value::Record(record)) => {
            encode_record_into(out, schema, record)?;
        }

        (FieldType::List(item_type), Value::List(items)) => {
            let mut body = Vec::new();
            for item in items {
                encode_value(&mut body, field, item, item_type)?;
            }
            encode_length(out, field, body.len())?;
            out.extend_from_slice(&body);
        }

        _ => return Err(mismatch(field, field_type)),
    }
    Ok(())
}
