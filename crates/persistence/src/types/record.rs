//! Rows as column-name to scalar-value mappings.

use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// One row: column name to scalar value.
pub type Record = Map<String, Value>;

/// The primary-key projection of a row.
pub type PrimaryKey = Map<String, Value>;

/// Splits a request payload into rows.
///
/// A payload is either a single object or an array of objects; anything else
/// is an `InvalidArgument`.
pub fn records_from_json(payload: Value) -> StorageResult<Vec<Record>> {
    match payload {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(StorageError::invalid_argument(
                    format!("data[{}]", i),
                    format!("expected an object, got {}", other),
                )),
            })
            .collect(),
        other => Err(StorageError::invalid_argument(
            "data",
            format!("expected an object or an array of objects, got {}", other),
        )),
    }
}

/// Checks that a value can live in a single column.
pub fn ensure_scalar(column: &str, value: &Value) -> StorageResult<()> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(StorageError::invalid_argument(
            column,
            "only scalar values can be stored or compared",
        )),
        _ => Ok(()),
    }
}

/// Projects `record` onto `columns`, keeping the column order.
pub fn project(record: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .filter_map(|c| record.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

/// Renders a scalar as plain text (strings unquoted).
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
