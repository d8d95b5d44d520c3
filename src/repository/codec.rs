use super::repository::RepositoryError;
use crate::core::{ColumnType, Row, TableSchema, Value};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

/// A stored row as seen by callers: column name -> JSON value.
pub type Record = Map<String, JsonValue>;

/// Converts an incoming JSON value into the storage value for a column.
pub fn coerce_value(
    column: &str,
    column_type: ColumnType,
    value: &JsonValue,
) -> Result<Value, RepositoryError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let coerced = match column_type {
        ColumnType::Integer => match value {
            JsonValue::Bool(b) => Some(Value::Integer(i64::from(*b))),
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(Value::Integer),
            _ => None,
        },
        ColumnType::Float => value.as_f64().map(Value::Float),
        ColumnType::Boolean => value.as_bool().map(Value::Boolean),
        ColumnType::Text => Some(match value {
            JsonValue::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }),
        ColumnType::Json => Some(Value::Json(value.clone())),
        ColumnType::Timestamp => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
    };

    coerced.ok_or_else(|| {
        RepositoryError::Validation(format!(
            "Field '{}' expects {}, got {}",
            column,
            column_type.as_str(),
            value
        ))
    })
}

fn integral_f64(f: f64) -> Option<i64> {
    // i64::MAX is not representable as f64; the bound is exclusive
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Emits every physical column, including `id`, `created_at` and `parent_id`.
pub fn row_to_record(schema: &TableSchema, row: &Row) -> Record {
    schema
        .columns()
        .iter()
        .zip(row)
        .map(|(column, value)| (column.name.clone(), value.to_json()))
        .collect()
}
