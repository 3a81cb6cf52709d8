//! Versioned attribute side-table descriptions.

use crate::error::{StorageError, StorageResult};
use crate::types::{NEG_INFINITY, POS_INFINITY};

use super::entity::EntitySchema;

/// Columns every attribute table has after its parent-key columns.
pub const ATTRIBUTE_COLUMNS: [&str; 6] = ["name", "value", "lang", "parl", "since", "until"];

/// Sentinel for "no language".
pub const DEFAULT_LANG: &str = "-";

/// Sentinel for "not parliament-specific".
pub const DEFAULT_PARL: &str = "-";

/// Immutable description of a versioned attribute table.
///
/// Rows are `(parent_key…, name, value, lang, parl, since, until)` keyed by
/// `(parent_key…, name, lang, parl, since)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    parent_key: Vec<String>,
    entity: EntitySchema,
}

impl AttributeSchema {
    /// Describes `table` with the given parent-key columns.
    pub fn new<I, S>(table: impl Into<String>, parent_key: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent_key: Vec<String> = parent_key.into_iter().map(Into::into).collect();
        let entity = Self::describe(table.into(), &parent_key, None)?;
        Ok(Self { parent_key, entity })
    }

    /// Describes the attribute table of `parent`.
    ///
    /// Parent-key columns are named `<parent table>_<key column>` and
    /// reference the parent's primary key.
    pub fn for_entity(parent: &EntitySchema, table: impl Into<String>) -> StorageResult<Self> {
        let parent_key: Vec<String> = parent
            .primary_key()
            .iter()
            .map(|k| format!("{}_{}", parent.table(), k))
            .collect();
        let entity = Self::describe(table.into(), &parent_key, Some(parent))?;
        Ok(Self { parent_key, entity })
    }

    fn describe(
        table: String,
        parent_key: &[String],
        parent: Option<&EntitySchema>,
    ) -> StorageResult<EntitySchema> {
        if parent_key.is_empty() {
            return Err(StorageError::missing_argument(format!(
                "parent key of attribute table '{}'",
                table
            )));
        }
        if let Some(clash) = parent_key
            .iter()
            .find(|k| ATTRIBUTE_COLUMNS.contains(&k.as_str()))
        {
            return Err(StorageError::invalid_argument(
                clash,
                "parent-key column clashes with an attribute column",
            ));
        }

        let mut key: Vec<String> = parent_key.to_vec();
        key.extend(["name", "lang", "parl", "since"].map(String::from));

        let mut builder = EntitySchema::builder(table)
            .columns(parent_key.iter().cloned())
            .columns(ATTRIBUTE_COLUMNS)
            .primary_key(key)
            .not_null("until")
            .default_value("lang", DEFAULT_LANG)
            .default_value("parl", DEFAULT_PARL)
            .default_value("since", NEG_INFINITY)
            .default_value("until", POS_INFINITY);
        if let Some(parent) = parent {
            builder = builder.references(
                parent_key.iter().cloned(),
                parent.table(),
                parent.primary_key().iter().cloned(),
            );
        }
        builder.build()
    }

    /// Table name.
    pub fn table(&self) -> &str {
        self.entity.table()
    }

    /// Parent-key columns, in order.
    pub fn parent_key(&self) -> &[String] {
        &self.parent_key
    }

    /// All columns, in order.
    pub fn columns(&self) -> &[String] {
        self.entity.columns()
    }

    /// The equivalent fixed-schema description (used for DDL and row access).
    pub fn entity_schema(&self) -> &EntitySchema {
        &self.entity
    }
}
