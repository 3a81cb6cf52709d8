//! Store traits.
//!
//! [`TableStorage`] is the request/response surface every store exposes:
//! `read(filter)`, `create(data)`, `update(filter, data)`, `delete(filter)`
//! over rows of one table. [`TemporalStorage`] adds the operations specific to
//! versioned attribute tables.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ResourceError, StorageError, StorageResult};
use crate::schema::{DEFAULT_LANG, DEFAULT_PARL};
use crate::types::{Filter, Instant, PrimaryKey, Record};

/// CRUD over the rows of one table.
///
/// Every call is atomic on its own; a batch `create` commits all of its rows
/// or none of them. There is no transaction spanning several calls.
///
/// # Example
///
/// ```ignore
/// use parldata_persistence::core::TableStorage;
/// use parldata_persistence::types::{Filter, Record};
/// use serde_json::json;
///
/// async fn rename<S: TableStorage>(mps: &S) -> parldata_persistence::StorageResult<()> {
///     let mut data = Record::new();
///     data.insert("last_name".to_string(), json!("Nováková"));
///     let keys = mps.update(&Filter::new().eq("id", 7), data).await?;
///     assert_eq!(keys.len(), 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait TableStorage: Send + Sync {
    /// Name of the underlying table.
    fn table(&self) -> &str;

    /// Returns every row matching `filter`, in storage order unless `_order`
    /// says otherwise.
    async fn read(&self, filter: &Filter) -> StorageResult<Vec<Record>>;

    /// Returns the first row matching `filter`.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - If no row matches
    async fn read_one(&self, filter: &Filter) -> StorageResult<Record> {
        self.read(filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::Resource(ResourceError::NotFound {
                    table: self.table().to_string(),
                    filter: filter.describe(),
                })
            })
    }

    /// Inserts `rows` in one transaction and returns their primary keys in
    /// input order.
    ///
    /// # Errors
    ///
    /// * `ValidationError::ReadOnlyViolation` - If a row sets a read-only column
    /// * `ValidationError::InvalidArgument` - If a row names an unknown column
    /// * `StorageError::Backend` - If the database rejects any row; nothing is
    ///   committed in that case
    async fn create(&self, rows: Vec<Record>) -> StorageResult<Vec<PrimaryKey>>;

    /// Inserts a single row.
    async fn create_one(&self, row: Record) -> StorageResult<PrimaryKey> {
        let table = self.table().to_string();
        self.create(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::missing_argument(format!("primary key of new '{}' row", table))
            })
    }

    /// Applies `data` to every row matching `filter` and returns the primary
    /// keys of the affected rows.
    async fn update(&self, filter: &Filter, data: Record) -> StorageResult<Vec<PrimaryKey>>;

    /// Removes every row matching `filter` and returns their primary keys.
    ///
    /// Deleting nothing is not an error.
    async fn delete(&self, filter: &Filter) -> StorageResult<Vec<PrimaryKey>>;
}

/// One value of a versioned attribute, without its validity interval.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValue {
    /// Parent-key columns and their values.
    pub parent: PrimaryKey,
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: Value,
    /// Language, `-` for none.
    pub lang: String,
    /// Parliament, `-` when not parliament-specific.
    pub parl: String,
}

impl AttributeValue {
    /// A language- and parliament-neutral value.
    pub fn new(parent: PrimaryKey, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            parent,
            name: name.into(),
            value: value.into(),
            lang: DEFAULT_LANG.to_string(),
            parl: DEFAULT_PARL.to_string(),
        }
    }

    /// Sets the language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Sets the parliament.
    pub fn with_parl(mut self, parl: impl Into<String>) -> Self {
        self.parl = parl.into();
        self
    }

    /// The filter selecting every version of this attribute.
    pub fn versions_filter(&self) -> Filter {
        let mut filter = Filter::from_map(self.parent.clone());
        filter.insert("name", Value::String(self.name.clone()));
        filter.insert("lang", Value::String(self.lang.clone()));
        filter.insert("parl", Value::String(self.parl.clone()));
        filter
    }
}

/// Operations of versioned attribute tables.
#[async_trait]
pub trait TemporalStorage: TableStorage {
    /// Returns the versions matching `filter` that are valid at `at`.
    async fn read_at(&self, filter: &Filter, at: Instant) -> StorageResult<Vec<Record>> {
        self.read(&filter.clone().at(at)).await
    }

    /// Atomically closes the version valid at `at` and opens a new one.
    ///
    /// Versions starting exactly at `at` are removed, every other version
    /// containing `at` gets `until = at`, then the new value is inserted as
    /// `[at, until)` where `until` is the start of the next later version
    /// (`+inf` if there is none). Nothing is written when the version valid
    /// at `at` already carries `value`; `None` is returned in that case.
    async fn supersede(
        &self,
        value: AttributeValue,
        at: Instant,
    ) -> StorageResult<Option<PrimaryKey>>;

    /// All versions of `name` for one parent, any language or parliament,
    /// ordered by `since`.
    async fn history(&self, parent: &PrimaryKey, name: &str) -> StorageResult<Vec<Record>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_value_defaults() {
        let parent = json!({"mp_id": 3}).as_object().cloned().unwrap();
        let value = AttributeValue::new(parent, "email", "a@b.cz");
        assert_eq!(value.lang, "-");
        assert_eq!(value.parl, "-");

        let filter = value.with_parl("psp").versions_filter();
        assert_eq!(filter.get("mp_id"), Some(&json!(3)));
        assert_eq!(filter.get("parl"), Some(&json!("psp")));
        assert_eq!(filter.get("name"), Some(&json!("email")));
    }
}
