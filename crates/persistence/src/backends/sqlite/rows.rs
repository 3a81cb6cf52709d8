//! Row-level statements shared by the SQLite stores.
//!
//! Everything here runs on a plain [`Connection`], so the same helpers serve
//! pooled connections and open transactions alike.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::{SqlFragment, SqlParam, quote_ident};
use crate::schema::EntitySchema;
use crate::types::{PrimaryKey, Record, ensure_scalar};

pub(crate) fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

/// Converts a column value to JSON. Blobs become base64 text.
pub(crate) fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}

/// Runs `sql` and maps each result row onto `columns` (by position).
pub(crate) fn query_records(
    conn: &Connection,
    sql: &SqlFragment,
    columns: &[String],
) -> StorageResult<Vec<Record>> {
    tracing::debug!(sql = %sql.sql, params = sql.params.len(), "query");
    let mut stmt = conn.prepare(&sql.sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(sql.params.iter()), |row| {
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), to_json(row.get_ref(i)?));
        }
        Ok(record)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

/// Rejects columns the caller may not write and non-scalar values.
pub(crate) fn check_data(schema: &EntitySchema, data: &Record) -> StorageResult<()> {
    for (column, value) in data {
        if !schema.has_column(column) {
            return Err(StorageError::invalid_argument(
                column,
                format!("not a column of table '{}'", schema.table()),
            ));
        }
        if schema.is_read_only(column) {
            return Err(StorageError::read_only(schema.table(), column));
        }
        ensure_scalar(column, value)?;
    }
    Ok(())
}

fn returning(schema: &EntitySchema) -> String {
    let keys: Vec<String> = schema.primary_key().iter().map(|k| quote_ident(k)).collect();
    format!(" RETURNING {}", keys.join(", "))
}

/// Inserts one row and returns its primary key.
pub(crate) fn insert_row(
    conn: &Connection,
    schema: &EntitySchema,
    row: &Record,
) -> StorageResult<PrimaryKey> {
    let mut sql = SqlFragment::new(format!("INSERT INTO {}", quote_ident(schema.table())));
    if row.is_empty() {
        sql.push_sql(" DEFAULT VALUES");
    } else {
        let mut placeholders = Vec::with_capacity(row.len());
        for (column, value) in row {
            placeholders.push(sql.add_param(SqlParam::from_json(column, value)?));
        }
        let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
        sql.push_sql(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
    }
    sql.push_sql(&returning(schema));

    query_records(conn, &sql, schema.primary_key())?
        .into_iter()
        .next()
        .ok_or_else(|| internal_error(format!("insert into '{}' returned no key", schema.table())))
}

/// Applies `data` to the rows selected by `target` (a ` WHERE …` clause or
/// empty) and returns their primary keys.
pub(crate) fn update_rows(
    conn: &Connection,
    schema: &EntitySchema,
    target: SqlFragment,
    data: &Record,
) -> StorageResult<Vec<PrimaryKey>> {
    let mut sql = SqlFragment::new(format!("UPDATE {} SET ", quote_ident(schema.table())));
    let mut assignments = Vec::with_capacity(data.len());
    for (column, value) in data {
        let placeholder = sql.add_param(SqlParam::from_json(column, value)?);
        assignments.push(format!("{} = {}", quote_ident(column), placeholder));
    }
    sql.push_sql(&assignments.join(", "));
    sql.append(target);
    sql.push_sql(&returning(schema));
    query_records(conn, &sql, schema.primary_key())
}

/// Removes the rows selected by `target` and returns their primary keys.
pub(crate) fn delete_rows(
    conn: &Connection,
    schema: &EntitySchema,
    target: SqlFragment,
) -> StorageResult<Vec<PrimaryKey>> {
    let mut sql = SqlFragment::new(format!("DELETE FROM {}", quote_ident(schema.table())));
    sql.append(target);
    sql.push_sql(&returning(schema));
    query_records(conn, &sql, schema.primary_key())
}
