//! Fixed-schema table descriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::query::{quote_ident, quote_literal};

use super::validate_identifier;

/// How the store fills a read-only column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    /// Auto-incrementing integer surrogate key (single-column key only).
    Serial,
    /// Creation timestamp in canonical instant text.
    CreatedAt,
}

/// A column only the store may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyColumn {
    /// Column name.
    pub name: String,
    /// Value generator.
    pub generator: Generator,
}

/// A foreign key from this table to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns in this table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub table: String,
    /// Referenced columns.
    pub target_columns: Vec<String>,
}

/// Immutable description of one fixed-schema table.
///
/// Built once at startup with [`EntitySchema::builder`] and shared by the
/// stores that operate on the table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    table: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
    read_only: Vec<ReadOnlyColumn>,
    not_null: Vec<String>,
    defaults: Vec<(String, Value)>,
    foreign_keys: Vec<ForeignKey>,
}

impl EntitySchema {
    /// Starts describing `table`.
    pub fn builder(table: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            table: table.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            read_only: Vec::new(),
            not_null: Vec::new(),
            defaults: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Primary-key columns, in order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Foreign keys.
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Returns true if `column` is declared.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Returns true if `column` may only be written by the store.
    pub fn is_read_only(&self, column: &str) -> bool {
        self.read_only.iter().any(|c| c.name == column)
    }

    /// Returns true if `column` is part of the primary key.
    pub fn is_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Columns that are not part of the primary key.
    pub fn non_key_columns(&self) -> impl Iterator<Item = &String> {
        self.columns.iter().filter(|c| !self.is_key(c))
    }

    /// The default value declared for `column`, if any.
    pub fn default_for(&self, column: &str) -> Option<&Value> {
        self.defaults
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Renders the `CREATE TABLE IF NOT EXISTS` statement.
    pub fn create_table_sql(&self) -> String {
        let serial = self
            .read_only
            .iter()
            .find(|c| c.generator == Generator::Serial)
            .map(|c| c.name.as_str());

        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut line = quote_ident(column);
                if Some(column.as_str()) == serial {
                    line.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
                    return line;
                }
                if self.is_key(column) || self.not_null.contains(column) {
                    line.push_str(" NOT NULL");
                }
                if let Some(ro) = self.read_only.iter().find(|c| &c.name == column) {
                    if ro.generator == Generator::CreatedAt {
                        line.push_str(" DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))");
                    }
                } else if let Some(value) = self.default_for(column) {
                    line.push_str(&format!(" DEFAULT {}", quote_literal(value)));
                }
                line
            })
            .collect();

        if serial.is_none() {
            lines.push(format!("PRIMARY KEY ({})", join_quoted(&self.primary_key)));
        }

        for fk in &self.foreign_keys {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
                join_quoted(&fk.columns),
                quote_ident(&fk.table),
                join_quoted(&fk.target_columns)
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.table),
            lines.join(",\n    ")
        )
    }
}

fn join_quoted(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    table: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
    read_only: Vec<ReadOnlyColumn>,
    not_null: Vec<String>,
    defaults: Vec<(String, Value)>,
    foreign_keys: Vec<ForeignKey>,
}

impl EntitySchemaBuilder {
    /// Declares a column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    /// Declares several columns.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the primary key.
    pub fn primary_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = names.into_iter().map(Into::into).collect();
        self
    }

    /// Marks `name` as a store-generated integer surrogate key.
    pub fn serial(mut self, name: impl Into<String>) -> Self {
        self.read_only.push(ReadOnlyColumn {
            name: name.into(),
            generator: Generator::Serial,
        });
        self
    }

    /// Marks `name` as a store-generated creation timestamp.
    pub fn created_at(mut self, name: impl Into<String>) -> Self {
        self.read_only.push(ReadOnlyColumn {
            name: name.into(),
            generator: Generator::CreatedAt,
        });
        self
    }

    /// Declares a `NOT NULL` constraint.
    pub fn not_null(mut self, name: impl Into<String>) -> Self {
        self.not_null.push(name.into());
        self
    }

    /// Declares a column default.
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((name.into(), value.into()));
        self
    }

    /// Declares a foreign key.
    pub fn references<I, J, S, T>(mut self, columns: I, table: impl Into<String>, target: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        self.foreign_keys.push(ForeignKey {
            columns: columns.into_iter().map(Into::into).collect(),
            table: table.into(),
            target_columns: target.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Validates and freezes the description.
    pub fn build(self) -> StorageResult<EntitySchema> {
        validate_identifier(&self.table)?;
        if self.columns.is_empty() {
            return Err(StorageError::missing_argument(format!(
                "columns of table '{}'",
                self.table
            )));
        }
        for (i, column) in self.columns.iter().enumerate() {
            validate_identifier(column)?;
            if self.columns[..i].contains(column) {
                return Err(StorageError::invalid_argument(
                    column,
                    format!("declared twice in table '{}'", self.table),
                ));
            }
        }
        if self.primary_key.is_empty() {
            return Err(StorageError::missing_argument(format!(
                "primary key of table '{}'",
                self.table
            )));
        }

        let undeclared = self
            .primary_key
            .iter()
            .chain(self.read_only.iter().map(|c| &c.name))
            .chain(self.not_null.iter())
            .chain(self.defaults.iter().map(|(c, _)| c))
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.columns.iter()))
            .find(|c| !self.columns.contains(*c));
        if let Some(column) = undeclared {
            return Err(StorageError::invalid_argument(
                column,
                format!("not a column of table '{}'", self.table),
            ));
        }

        for ro in &self.read_only {
            if ro.generator == Generator::Serial && self.primary_key != [ro.name.clone()] {
                return Err(StorageError::invalid_argument(
                    &ro.name,
                    "a serial column must be the whole primary key",
                ));
            }
        }

        for fk in &self.foreign_keys {
            validate_identifier(&fk.table)?;
            for column in &fk.target_columns {
                validate_identifier(column)?;
            }
            if fk.columns.len() != fk.target_columns.len() || fk.columns.is_empty() {
                return Err(StorageError::invalid_argument(
                    &fk.table,
                    "foreign key column counts differ",
                ));
            }
        }

        Ok(EntitySchema {
            table: self.table,
            columns: self.columns,
            primary_key: self.primary_key,
            read_only: self.read_only,
            not_null: self.not_null,
            defaults: self.defaults,
            foreign_keys: self.foreign_keys,
        })
    }
}
