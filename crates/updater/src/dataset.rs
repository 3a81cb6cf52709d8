//! Parliament datasets and how they are written to the stores.
//!
//! A [`Dataset`] is what a handler's `scrape` produces: rows for the
//! fixed-schema tables, attribute values and area patterns. Rows reference
//! their parents by a lookup filter rather than by generated keys, so a
//! dataset can be produced without knowing the database it ends up in.
//!
//! Applying a dataset is idempotent: rows are upserted, attribute values go
//! through `supersede` and area patterns are only created when missing. Each
//! store call is atomic on its own, but the dataset as a whole is not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parldata_persistence::area::WILDCARD;
use parldata_persistence::backends::sqlite::EntityStore;
use parldata_persistence::error::ResourceError;
use parldata_persistence::schema::{AREA_FIELDS, AreaSchema, CONSTITUENCY_COLUMN};
use parldata_persistence::types::{project, scalar_text};
use parldata_persistence::{
    AttributeValue, Filter, Instant, PrimaryKey, Record, StorageError, TableStorage,
    TemporalStorage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{UpdaterError, UpdaterResult};
use crate::tables::Stores;

/// Everything one scrape of a parliament produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// When the source was read. Attribute values without their own `since`
    /// become valid from this moment (or from now when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
    /// Fixed-schema rows, applied in order so parents precede children.
    pub entities: Vec<EntityRows>,
    /// Attribute values.
    pub attributes: Vec<AttributeEntry>,
    /// Area patterns.
    pub areas: Vec<AreaEntry>,
}

/// Rows for one fixed-schema table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRows {
    /// Table name.
    pub table: String,
    /// Columns identifying an existing row; the primary key when empty.
    /// Tables with a generated key need a natural key here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_on: Vec<String>,
    /// The rows.
    pub rows: Vec<Record>,
}

/// One attribute value of one parent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEntry {
    /// Attribute table name.
    pub table: String,
    /// Filter selecting exactly one parent row.
    pub parent: Record,
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parl: Option<String>,
    /// Start of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// One area pattern of one constituency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaEntry {
    /// Filter selecting exactly one constituency.
    pub constituency: Record,
    /// Address fields; omitted ones are wildcards.
    #[serde(flatten)]
    pub pattern: Record,
}

/// Counts of what applying a dataset did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub attributes_written: usize,
    pub attributes_unchanged: usize,
    pub areas_created: usize,
    pub areas_existing: usize,
}

impl Dataset {
    /// Parses a dataset document.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Default start of validity for attribute values.
    pub fn effective_since(&self) -> Instant {
        self.scraped_at.map(Instant::at).unwrap_or_else(Instant::now)
    }

    /// Writes the dataset to `stores`.
    pub async fn apply(&self, stores: &Stores) -> UpdaterResult<UpdateSummary> {
        let mut summary = UpdateSummary::default();

        for rows in &self.entities {
            let store = stores
                .entity(&rows.table)
                .ok_or_else(|| UpdaterError::UnknownTable(rows.table.clone()))?;
            let key_columns = if rows.match_on.is_empty() {
                store.schema().primary_key().to_vec()
            } else {
                rows.match_on.clone()
            };
            for row in &rows.rows {
                upsert(store, &key_columns, row, &mut summary).await?;
            }
        }

        let default_since = self.effective_since();
        for entry in &self.attributes {
            let at = match &entry.since {
                Some(since) => Instant::parse(since)?,
                None => default_since,
            };
            if write_attribute(stores, entry, at).await? {
                summary.attributes_written += 1;
            } else {
                summary.attributes_unchanged += 1;
            }
        }

        if !self.areas.is_empty() {
            let constituencies = stores
                .entity("constituency")
                .ok_or_else(|| UpdaterError::UnknownTable("constituency".to_string()))?;
            let existing = EntityStore::new(
                stores.backend().clone(),
                Arc::new(stores.area().schema().entity_schema().clone()),
            );
            for entry in &self.areas {
                let row = area_row(constituencies, entry).await?;
                let found = existing.read(&Filter::from_map(row.clone()).limit(1)).await?;
                if found.is_empty() {
                    stores.area().create_one(row).await?;
                    summary.areas_created += 1;
                } else {
                    summary.areas_existing += 1;
                }
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            attributes = summary.attributes_written,
            areas = summary.areas_created,
            "Dataset applied"
        );
        Ok(summary)
    }
}

/// Returns the single row matching `filter`, `None` when nothing matches and
/// `Ambiguous` when several rows do.
async fn find_unique(store: &EntityStore, filter: Filter) -> UpdaterResult<Option<Record>> {
    let mut found = store.read(&filter.limit(2)).await?;
    match found.len() {
        0 | 1 => Ok(found.pop()),
        _ => {
            let key = store.schema().primary_key();
            Err(StorageError::from(ResourceError::Ambiguous {
                table: store.table().to_string(),
                candidates: found
                    .iter()
                    .map(|row| Value::Object(project(row, key)).to_string())
                    .collect(),
            })
            .into())
        }
    }
}

async fn find_one(store: &EntityStore, lookup: &Record) -> UpdaterResult<Record> {
    let filter = Filter::from_map(lookup.clone());
    find_unique(store, filter.clone()).await?.ok_or_else(|| {
        StorageError::from(ResourceError::NotFound {
            table: store.table().to_string(),
            filter: filter.describe(),
        })
        .into()
    })
}

async fn upsert(
    store: &EntityStore,
    key_columns: &[String],
    row: &Record,
    summary: &mut UpdateSummary,
) -> UpdaterResult<()> {
    let schema = store.schema();
    let mut filter = Filter::new();
    for column in key_columns {
        let value = row.get(column).ok_or_else(|| {
            StorageError::missing_argument(format!("{}.{}", schema.table(), column))
        })?;
        filter = filter.eq(column.clone(), value.clone());
    }

    let Some(existing) = find_unique(store, filter).await? else {
        store.create_one(row.clone()).await?;
        summary.created += 1;
        return Ok(());
    };

    let changes: Record = row
        .iter()
        .filter(|(column, value)| {
            !schema.is_key(column)
                && !schema.is_read_only(column)
                && existing.get(*column) != Some(*value)
        })
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();
    if changes.is_empty() {
        summary.unchanged += 1;
        return Ok(());
    }

    debug!(table = %schema.table(), columns = changes.len(), "Updating row");
    let key = project(&existing, schema.primary_key());
    store.update(&Filter::from_map(key), changes).await?;
    summary.updated += 1;
    Ok(())
}

/// Supersedes one attribute value; returns false when it was already current.
async fn write_attribute(stores: &Stores, entry: &AttributeEntry, at: Instant) -> UpdaterResult<bool> {
    let store = stores
        .attribute(&entry.table)
        .ok_or_else(|| UpdaterError::UnknownTable(entry.table.clone()))?;
    let schema = store.schema();
    let parent_table = schema
        .entity_schema()
        .foreign_keys()
        .first()
        .map(|fk| fk.table.clone())
        .ok_or_else(|| UpdaterError::UnknownTable(entry.table.clone()))?;
    let parents = stores
        .entity(&parent_table)
        .ok_or(UpdaterError::UnknownTable(parent_table))?;

    let parent = find_one(parents, &entry.parent).await?;
    let key: PrimaryKey = schema
        .parent_key()
        .iter()
        .zip(parents.schema().primary_key())
        .map(|(column, parent_column)| {
            let value = parent.get(parent_column).cloned().unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect();

    let mut value = AttributeValue::new(key, entry.name.clone(), entry.value.clone());
    if let Some(lang) = &entry.lang {
        value = value.with_lang(lang.clone());
    }
    if let Some(parl) = &entry.parl {
        value = value.with_parl(parl.clone());
    }
    Ok(store.supersede(value, at).await?.is_some())
}

async fn area_row(constituencies: &EntityStore, entry: &AreaEntry) -> UpdaterResult<Record> {
    if let Some(unknown) = entry
        .pattern
        .keys()
        .find(|k| !AreaSchema::is_area_field(k))
    {
        return Err(StorageError::invalid_argument(unknown.clone(), "not an address field").into());
    }

    let constituency = find_one(constituencies, &entry.constituency).await?;
    let id = constituencies
        .schema()
        .primary_key()
        .first()
        .and_then(|pk| constituency.get(pk))
        .cloned()
        .unwrap_or(Value::Null);

    let mut row = Record::new();
    row.insert(CONSTITUENCY_COLUMN.to_string(), id);
    for field in AREA_FIELDS {
        let text = match entry.pattern.get(field) {
            None | Some(Value::Null) => WILDCARD.to_string(),
            Some(value) => scalar_text(value),
        };
        row.insert(field.to_string(), Value::String(text));
    }
    Ok(row)
}
