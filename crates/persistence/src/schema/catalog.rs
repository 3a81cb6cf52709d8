//! Collection of table descriptions handed to the backend at startup.

use std::sync::Arc;

use crate::error::{StorageError, StorageResult};

use super::{AreaSchema, AttributeSchema, EntitySchema};

/// Ordered set of table descriptions.
///
/// Tables are created in insertion order, so parents must be added before
/// the tables referencing them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<Arc<EntitySchema>>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed-schema table.
    pub fn add_entity(&mut self, schema: &EntitySchema) -> StorageResult<()> {
        self.push(schema.clone())
    }

    /// Adds an attribute table.
    pub fn add_attribute(&mut self, schema: &AttributeSchema) -> StorageResult<()> {
        self.push(schema.entity_schema().clone())
    }

    /// Adds an area table.
    pub fn add_area(&mut self, schema: &AreaSchema) -> StorageResult<()> {
        self.push(schema.entity_schema().clone())
    }

    fn push(&mut self, schema: EntitySchema) -> StorageResult<()> {
        if self.get(schema.table()).is_some() {
            return Err(StorageError::invalid_argument(
                schema.table(),
                "table registered twice",
            ));
        }
        self.tables.push(Arc::new(schema));
        Ok(())
    }

    /// Looks a table up by name.
    pub fn get(&self, table: &str) -> Option<&Arc<EntitySchema>> {
        self.tables.iter().find(|t| t.table() == table)
    }

    /// All tables, in creation order.
    pub fn tables(&self) -> &[Arc<EntitySchema>] {
        &self.tables
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
