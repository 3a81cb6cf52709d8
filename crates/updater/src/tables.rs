//! The parliament table catalog and the stores built over it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parldata_persistence::backends::sqlite::{AreaStore, AttributeStore, EntityStore, SqliteBackend};
use parldata_persistence::core::Backend;
use parldata_persistence::schema::{AreaSchema, AttributeSchema, Catalog, EntitySchema};
use parldata_persistence::StorageResult;
use tracing::info;

use crate::config::UpdaterConfig;
use crate::error::UpdaterResult;

/// Name of the area pattern table.
pub const AREA_TABLE: &str = "area";

fn parliament() -> StorageResult<EntitySchema> {
    EntitySchema::builder("parliament")
        .columns(["code", "name", "country_code", "time_zone"])
        .primary_key(["code"])
        .not_null("name")
        .build()
}

fn mp() -> StorageResult<EntitySchema> {
    EntitySchema::builder("mp")
        .columns([
            "id",
            "first_name",
            "middle_names",
            "last_name",
            "disambiguation",
            "sex",
            "born_on",
            "died_on",
            "created_at",
        ])
        .primary_key(["id"])
        .serial("id")
        .created_at("created_at")
        .not_null("last_name")
        .build()
}

fn group() -> StorageResult<EntitySchema> {
    EntitySchema::builder("group")
        .columns(["id", "parliament_code", "name", "short_name", "group_kind"])
        .primary_key(["id"])
        .serial("id")
        .not_null("name")
        .references(["parliament_code"], "parliament", ["code"])
        .build()
}

fn constituency() -> StorageResult<EntitySchema> {
    EntitySchema::builder("constituency")
        .columns(["id", "parliament_code", "name", "short_name"])
        .primary_key(["id"])
        .serial("id")
        .not_null("name")
        .references(["parliament_code"], "parliament", ["code"])
        .build()
}

/// Every store of the parliament database, opened over one backend.
#[derive(Debug, Clone)]
pub struct Stores {
    backend: SqliteBackend,
    catalog: Catalog,
    entities: BTreeMap<String, EntityStore>,
    attributes: BTreeMap<String, AttributeStore>,
    area: AreaStore,
}

impl Stores {
    /// Describes the tables, creates them if needed and opens the stores.
    pub async fn open(backend: SqliteBackend) -> StorageResult<Self> {
        let mut catalog = Catalog::new();
        let mut entities = BTreeMap::new();
        let mut attributes = BTreeMap::new();

        for schema in [parliament()?, mp()?, group()?, constituency()?] {
            let side = AttributeSchema::for_entity(&schema, format!("{}_attribute", schema.table()))?;
            catalog.add_entity(&schema)?;
            catalog.add_attribute(&side)?;

            let name = schema.table().to_string();
            entities.insert(
                name,
                EntityStore::new(backend.clone(), Arc::new(schema)),
            );
            attributes.insert(
                side.table().to_string(),
                AttributeStore::new(backend.clone(), Arc::new(side)),
            );
        }

        let area = {
            let constituency = entities["constituency"].schema().clone();
            AreaSchema::referencing(AREA_TABLE, &constituency)?
        };
        catalog.add_area(&area)?;

        backend.initialize(&catalog).await?;
        info!(tables = catalog.len(), "Parliament stores ready");

        Ok(Self {
            area: AreaStore::new(backend.clone(), Arc::new(area)),
            backend,
            catalog,
            entities,
            attributes,
        })
    }

    /// Opens the database named in `config` and the stores over it.
    pub async fn from_config(config: &UpdaterConfig) -> UpdaterResult<Self> {
        info!(database = %config.database_url, "Opening SQLite database");
        let backend = SqliteBackend::with_config(&config.database_url, config.backend_config())?;
        Ok(Self::open(backend).await?)
    }

    /// The backend every store shares.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    /// The table descriptions, in creation order.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// A fixed-schema store by table name.
    pub fn entity(&self, table: &str) -> Option<&EntityStore> {
        self.entities.get(table)
    }

    /// A temporal store by table name.
    pub fn attribute(&self, table: &str) -> Option<&AttributeStore> {
        self.attributes.get(table)
    }

    /// All temporal stores, keyed by table name.
    pub fn attributes(&self) -> impl Iterator<Item = (&String, &AttributeStore)> {
        self.attributes.iter()
    }

    /// The area pattern store.
    pub fn area(&self) -> &AreaStore {
        &self.area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_every_table() {
        let backend = SqliteBackend::in_memory().unwrap();
        let stores = Stores::open(backend.clone()).await.unwrap();

        let tables: Vec<&str> = stores.catalog().tables().iter().map(|t| t.table()).collect();
        assert_eq!(
            tables,
            vec![
                "parliament",
                "parliament_attribute",
                "mp",
                "mp_attribute",
                "group",
                "group_attribute",
                "constituency",
                "constituency_attribute",
                "area",
            ]
        );
        assert!(stores.entity("mp").is_some());
        assert!(stores.attribute("mp_attribute").is_some());
        assert!(stores.entity("vote").is_none());
        assert_eq!(
            stores.attribute("group_attribute").unwrap().schema().parent_key(),
            ["group_id".to_string()]
        );

        // Opening twice must not fail on existing tables.
        Stores::open(backend).await.unwrap();
    }
}
