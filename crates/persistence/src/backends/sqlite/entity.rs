//! Fixed-schema store.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::TransactionBehavior;

use crate::core::TableStorage;
use crate::error::{StorageError, StorageResult};
use crate::query::{CompiledFilter, FilterCompiler, select_sql, target_rows_sql};
use crate::schema::EntitySchema;
use crate::types::{Filter, PrimaryKey, Record};

use super::SqliteBackend;
use super::rows::{check_data, delete_rows, insert_row, query_records, update_rows};

/// Generic CRUD over one fixed-schema table.
#[derive(Debug, Clone)]
pub struct EntityStore {
    backend: SqliteBackend,
    schema: Arc<EntitySchema>,
}

impl EntityStore {
    /// Creates a store for `schema` over `backend`.
    pub fn new(backend: SqliteBackend, schema: Arc<EntitySchema>) -> Self {
        Self { backend, schema }
    }

    /// The table description.
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// The backend this store runs on.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    pub(crate) fn compiler(&self) -> FilterCompiler<'static> {
        FilterCompiler::new(self.schema.columns().iter().cloned())
    }

    pub(crate) fn select(&self, compiled: &CompiledFilter) -> StorageResult<Vec<Record>> {
        let sql = select_sql(self.schema.table(), self.schema.columns(), compiled);
        let conn = self.backend.get_connection()?;
        query_records(&conn, &sql, self.schema.columns())
    }

    /// Inserts already-checked rows in one transaction.
    pub(crate) fn insert_all(&self, rows: &[Record]) -> StorageResult<Vec<PrimaryKey>> {
        let mut conn = self.backend.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut keys = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match insert_row(&tx, &self.schema, row) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    // Dropping the transaction rolls it back.
                    tracing::warn!(
                        table = self.schema.table(),
                        row = i,
                        batch = rows.len(),
                        error = %e,
                        "insert failed, batch rolled back"
                    );
                    return Err(e);
                }
            }
        }

        tx.commit()?;
        tracing::info!(table = self.schema.table(), rows = keys.len(), "created rows");
        Ok(keys)
    }

    pub(crate) fn update_compiled(
        &self,
        compiled: &CompiledFilter,
        data: &Record,
    ) -> StorageResult<Vec<PrimaryKey>> {
        if data.is_empty() {
            return Err(StorageError::invalid_argument(
                "data",
                "nothing to update",
            ));
        }
        check_data(&self.schema, data)?;
        let target = target_rows_sql(self.schema.table(), compiled);
        let conn = self.backend.get_connection()?;
        let keys = update_rows(&conn, &self.schema, target, data)?;
        tracing::info!(table = self.schema.table(), rows = keys.len(), "updated rows");
        Ok(keys)
    }

    pub(crate) fn delete_compiled(&self, compiled: &CompiledFilter) -> StorageResult<Vec<PrimaryKey>> {
        let target = target_rows_sql(self.schema.table(), compiled);
        let conn = self.backend.get_connection()?;
        let keys = delete_rows(&conn, &self.schema, target)?;
        tracing::info!(table = self.schema.table(), rows = keys.len(), "deleted rows");
        Ok(keys)
    }
}

#[async_trait]
impl TableStorage for EntityStore {
    fn table(&self) -> &str {
        self.schema.table()
    }

    async fn read(&self, filter: &Filter) -> StorageResult<Vec<Record>> {
        let compiled = self.compiler().compile(filter)?;
        if compiled.point_in_time.is_some() {
            tracing::debug!(
                table = self.schema.table(),
                "point-in-time selector ignored on a fixed-schema table"
            );
        }
        self.select(&compiled)
    }

    async fn create(&self, rows: Vec<Record>) -> StorageResult<Vec<PrimaryKey>> {
        for row in &rows {
            check_data(&self.schema, row)?;
        }
        self.insert_all(&rows)
    }

    async fn update(&self, filter: &Filter, data: Record) -> StorageResult<Vec<PrimaryKey>> {
        let compiled = self.compiler().compile(filter)?;
        self.update_compiled(&compiled, &data)
    }

    async fn delete(&self, filter: &Filter) -> StorageResult<Vec<PrimaryKey>> {
        let compiled = self.compiler().compile(filter)?;
        self.delete_compiled(&compiled)
    }
}
