//! SQLite schema creation.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::Catalog;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

fn migration_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::MigrationError { message })
}

/// Initialize the database schema.
///
/// Creates the bookkeeping table and every catalog table that does not exist
/// yet, in one transaction. Running it again is a no-op.
pub fn initialize_schema(conn: &mut Connection, catalog: &Catalog) -> StorageResult<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| migration_error(format!("Failed to begin schema transaction: {}", e)))?;

    let current_version = get_schema_version(&tx)?;
    if current_version > SCHEMA_VERSION {
        return Err(migration_error(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    for table in catalog.tables() {
        let sql = table.create_table_sql();
        tracing::debug!(table = table.table(), sql = %sql, "ensuring table");
        tx.execute_batch(&sql).map_err(|e| {
            migration_error(format!("Failed to create table '{}': {}", table.table(), e))
        })?;
    }

    if current_version < SCHEMA_VERSION {
        set_schema_version(&tx, SCHEMA_VERSION)?;
    }

    tx.commit()
        .map_err(|e| migration_error(format!("Failed to commit schema: {}", e)))?;

    tracing::info!(
        tables = catalog.len(),
        version = SCHEMA_VERSION,
        "Database schema initialized"
    );
    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| migration_error(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| migration_error(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| migration_error(format!("Failed to clear schema_version: {}", e)))?;

    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| migration_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}
