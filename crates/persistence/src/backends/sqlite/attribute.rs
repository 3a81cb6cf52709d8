//! Temporal store over versioned attribute tables.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::TransactionBehavior;
use serde_json::Value;

use crate::core::{AttributeValue, TableStorage, TemporalStorage};
use crate::error::{StorageError, StorageResult};
use crate::query::{FilterCompiler, SqlFragment, SqlParam, quote_ident, select_sql};
use crate::schema::{AttributeSchema, DEFAULT_LANG, DEFAULT_PARL};
use crate::types::{Filter, Instant, PrimaryKey, Record};

use super::SqliteBackend;
use super::entity::EntityStore;
use super::rows::{check_data, insert_row, query_records};

const SINCE: &str = "since";
const UNTIL: &str = "until";

/// Versioned attribute store.
///
/// Rows carry a half-open validity interval `[since, until)`. Point-in-time
/// reads select the versions containing the requested instant; plain writes
/// do not check intervals for overlap, [`TemporalStorage::supersede`] does
/// the close-then-open step atomically.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    rows: EntityStore,
    schema: Arc<AttributeSchema>,
}

/// Rewrites a `since`/`until` value into canonical instant text.
///
/// `None` means the value should fall back to the column default.
fn normalize_bound(column: &str, value: &Value) -> StorageResult<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(Value::String(Instant::parse(text)?.to_sql_text()))),
        other => Err(StorageError::invalid_argument(
            column,
            format!("expected a timestamp string, got {}", other),
        )),
    }
}

impl AttributeStore {
    /// Creates a store for `schema` over `backend`.
    pub fn new(backend: SqliteBackend, schema: Arc<AttributeSchema>) -> Self {
        let rows = EntityStore::new(backend, Arc::new(schema.entity_schema().clone()));
        Self { rows, schema }
    }

    /// The table description.
    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    fn compiler(&self) -> FilterCompiler<'static> {
        self.rows.compiler().with_interval(SINCE, UNTIL)
    }

    /// Fills the sentinel defaults and canonicalizes the interval bounds.
    fn prepare_row(&self, mut row: Record) -> StorageResult<Record> {
        for (column, default) in [
            ("lang", Value::from(DEFAULT_LANG)),
            ("parl", Value::from(DEFAULT_PARL)),
        ] {
            match row.get(column) {
                None | Some(Value::Null) => {
                    row.insert(column.to_string(), default);
                }
                Some(_) => {}
            }
        }
        for (column, default) in [(SINCE, Instant::NegInfinity), (UNTIL, Instant::PosInfinity)] {
            let value = match row.get(column) {
                Some(value) => normalize_bound(column, value)?,
                None => None,
            };
            let value = value.unwrap_or_else(|| Value::String(default.to_sql_text()));
            row.insert(column.to_string(), value);
        }
        Ok(row)
    }

    /// Canonicalizes `since`/`until` equality values in a filter.
    fn prepare_filter(&self, filter: &Filter) -> StorageResult<Filter> {
        let mut filter = filter.clone();
        for column in [SINCE, UNTIL] {
            if let Some(value) = filter.get(column).cloned() {
                if let Some(normalized) = normalize_bound(column, &value)? {
                    filter.insert(column, normalized);
                }
            }
        }
        Ok(filter)
    }

    fn check_parent(&self, parent: &PrimaryKey) -> StorageResult<()> {
        for column in self.schema.parent_key() {
            if !parent.contains_key(column) {
                return Err(StorageError::missing_argument(column.clone()));
            }
        }
        if let Some(extra) = parent
            .keys()
            .find(|k| !self.schema.parent_key().contains(k))
        {
            return Err(StorageError::invalid_argument(
                extra,
                format!("not a parent-key column of '{}'", self.schema.table()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStorage for AttributeStore {
    fn table(&self) -> &str {
        self.schema.table()
    }

    async fn read(&self, filter: &Filter) -> StorageResult<Vec<Record>> {
        let filter = self.prepare_filter(filter)?;
        let compiled = self.compiler().compile(&filter)?;
        self.rows.select(&compiled)
    }

    async fn create(&self, rows: Vec<Record>) -> StorageResult<Vec<PrimaryKey>> {
        let rows = rows
            .into_iter()
            .map(|row| {
                check_data(self.rows.schema(), &row)?;
                self.prepare_row(row)
            })
            .collect::<StorageResult<Vec<_>>>()?;
        self.rows.insert_all(&rows)
    }

    async fn update(&self, filter: &Filter, data: Record) -> StorageResult<Vec<PrimaryKey>> {
        let filter = self.prepare_filter(filter)?;
        let mut data = data;
        for column in [SINCE, UNTIL] {
            if let Some(value) = data.get(column).cloned() {
                let value = normalize_bound(column, &value)?.ok_or_else(|| {
                    StorageError::invalid_argument(column, "interval bounds cannot be null")
                })?;
                data.insert(column.to_string(), value);
            }
        }
        let compiled = self.compiler().compile(&filter)?;
        self.rows.update_compiled(&compiled, &data)
    }

    async fn delete(&self, filter: &Filter) -> StorageResult<Vec<PrimaryKey>> {
        let filter = self.prepare_filter(filter)?;
        let compiled = self.compiler().compile(&filter)?;
        self.rows.delete_compiled(&compiled)
    }
}

#[async_trait]
impl TemporalStorage for AttributeStore {
    async fn supersede(
        &self,
        value: AttributeValue,
        at: Instant,
    ) -> StorageResult<Option<PrimaryKey>> {
        self.check_parent(&value.parent)?;
        crate::types::ensure_scalar("value", &value.value)?;

        let schema = self.rows.schema();
        let table = quote_ident(schema.table());
        let columns = schema.columns();
        let at_text = at.to_sql_text();
        let versions = value.versions_filter();
        let compiled = self.rows.compiler().compile(&versions)?;

        let mut conn = self.rows.backend().get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Versions containing `at`.
        let mut current = compiled.clone();
        current.predicate = current.predicate.and(SqlFragment::with_params(
            format!("{} <= ? AND {} > ?", quote_ident(SINCE), quote_ident(UNTIL)),
            vec![SqlParam::string(&at_text), SqlParam::string(&at_text)],
        ));
        let open = query_records(&tx, &select_sql(schema.table(), columns, &current), columns)?;
        if open.iter().any(|row| row.get("value") == Some(&value.value)) {
            tracing::debug!(
                table = schema.table(),
                name = %value.name,
                "attribute unchanged, nothing superseded"
            );
            return Ok(None);
        }

        // The new version ends where the next later version starts.
        let mut later = compiled.clone();
        later.predicate = later.predicate.and(SqlFragment::with_params(
            format!("{} > ?", quote_ident(SINCE)),
            vec![SqlParam::string(&at_text)],
        ));
        let mut next_sql = SqlFragment::new(format!("SELECT MIN({}) FROM {}", quote_ident(SINCE), table));
        later.push_where(&mut next_sql);
        let until = query_records(&tx, &next_sql, &[UNTIL.to_string()])?
            .into_iter()
            .next()
            .and_then(|row| row.get(UNTIL).cloned())
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| Value::String(Instant::PosInfinity.to_sql_text()));

        // A version starting exactly at `at` would shrink to nothing.
        let mut drop_sql = SqlFragment::new(format!("DELETE FROM {}", table));
        let mut starting = compiled.clone();
        starting.predicate = starting.predicate.and(SqlFragment::with_params(
            format!("{} = ?", quote_ident(SINCE)),
            vec![SqlParam::string(&at_text)],
        ));
        starting.push_where(&mut drop_sql);
        tx.execute(&drop_sql.sql, rusqlite::params_from_iter(drop_sql.params.iter()))?;

        let mut close_sql = SqlFragment::new(format!("UPDATE {} SET {} = ?", table, quote_ident(UNTIL)));
        close_sql.params.push(SqlParam::string(&at_text));
        current.push_where(&mut close_sql);
        let closed = tx.execute(&close_sql.sql, rusqlite::params_from_iter(close_sql.params.iter()))?;

        let mut row = value.parent.clone();
        row.insert("name".to_string(), Value::String(value.name.clone()));
        row.insert("value".to_string(), value.value.clone());
        row.insert("lang".to_string(), Value::String(value.lang.clone()));
        row.insert("parl".to_string(), Value::String(value.parl.clone()));
        row.insert(SINCE.to_string(), Value::String(at_text.clone()));
        row.insert(UNTIL.to_string(), until);
        let key = insert_row(&tx, schema, &row)?;

        tx.commit()?;
        tracing::info!(
            table = schema.table(),
            name = %value.name,
            since = %at_text,
            closed,
            "attribute superseded"
        );
        Ok(Some(key))
    }

    async fn history(&self, parent: &PrimaryKey, name: &str) -> StorageResult<Vec<Record>> {
        self.check_parent(parent)?;
        let filter = Filter::from_map(parent.clone())
            .eq("name", name)
            .order_by(SINCE)
            .order_by("lang")
            .order_by("parl");
        self.read(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Catalog;
    use crate::types::records_from_json;
    use serde_json::json;

    async fn store() -> AttributeStore {
        let schema = AttributeSchema::new("mp_attribute", ["mp_id"]).unwrap();
        let mut catalog = Catalog::new();
        catalog.add_attribute(&schema).unwrap();
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema(&catalog).unwrap();
        AttributeStore::new(backend, Arc::new(schema))
    }

    fn rows(value: Value) -> Vec<Record> {
        records_from_json(value).unwrap()
    }

    fn parent(id: i64) -> PrimaryKey {
        rows(json!({"mp_id": id})).remove(0)
    }

    fn at(text: &str) -> Instant {
        Instant::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_create_fills_defaults() {
        let store = store().await;
        let keys = store
            .create(rows(json!({"mp_id": 1, "name": "email", "value": "a@b.cz"})))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(keys[0].clone()),
            json!({"mp_id": 1, "name": "email", "lang": "-", "parl": "-", "since": "-infinity"})
        );

        let row = store
            .read_one(&Filter::from_map(keys[0].clone()))
            .await
            .unwrap();
        assert_eq!(row["until"], "infinity");
        assert_eq!(row["value"], "a@b.cz");
    }

    #[tokio::test]
    async fn test_bounds_are_normalized() {
        let store = store().await;
        store
            .create(rows(json!({
                "mp_id": 1, "name": "party", "value": "A", "since": "2020-01-01"
            })))
            .await
            .unwrap();

        let found = store
            .read(&Filter::new().eq("since", "2020-01-01 00:00:00"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["since"], "2020-01-01T00:00:00Z");

        let err = store
            .create(rows(json!({"mp_id": 1, "name": "x", "since": "soon"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_point_in_time_reads_are_half_open() {
        let store = store().await;
        store
            .create(rows(json!([
                {"mp_id": 1, "name": "party", "value": "A", "until": "2020-01-01"},
                {"mp_id": 1, "name": "party", "value": "B", "since": "2020-01-01"}
            ])))
            .await
            .unwrap();

        let filter = Filter::new().eq("mp_id", 1).eq("name", "party");
        let value_at = |t: &'static str| {
            let filter = filter.clone();
            let store = store.clone();
            async move { store.read_at(&filter, at(t)).await.unwrap() }
        };

        assert_eq!(value_at("2019-12-31").await[0]["value"], "A");
        assert_eq!(value_at("2020-06-01").await[0]["value"], "B");
        let boundary = value_at("2020-01-01").await;
        assert_eq!(boundary.len(), 1);
        assert_eq!(boundary[0]["value"], "B");

        assert_eq!(store.read(&filter).await.unwrap().len(), 2);
        assert_eq!(store.read(&filter.clone().now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_supersede_closes_and_opens() {
        let store = store().await;
        let value = AttributeValue::new(parent(1), "party", "A");
        let key = store.supersede(value, at("2018-01-01")).await.unwrap();
        assert!(key.is_some());

        let unchanged = AttributeValue::new(parent(1), "party", "A");
        assert!(store.supersede(unchanged, at("2019-01-01")).await.unwrap().is_none());

        let changed = AttributeValue::new(parent(1), "party", "B");
        store.supersede(changed, at("2020-01-01")).await.unwrap();

        let history = store.history(&parent(1), "party").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["value"], "A");
        assert_eq!(history[0]["since"], "2018-01-01T00:00:00Z");
        assert_eq!(history[0]["until"], "2020-01-01T00:00:00Z");
        assert_eq!(history[1]["value"], "B");
        assert_eq!(history[1]["until"], "infinity");
    }

    #[tokio::test]
    async fn test_supersede_before_later_version() {
        let store = store().await;
        store
            .supersede(AttributeValue::new(parent(1), "party", "B"), at("2020-01-01"))
            .await
            .unwrap();
        store
            .supersede(AttributeValue::new(parent(1), "party", "A"), at("2018-01-01"))
            .await
            .unwrap();

        let history = store.history(&parent(1), "party").await.unwrap();
        assert_eq!(history[0]["value"], "A");
        assert_eq!(history[0]["until"], "2020-01-01T00:00:00Z");
        assert_eq!(history[1]["value"], "B");
    }

    #[tokio::test]
    async fn test_supersede_at_same_instant_replaces() {
        let store = store().await;
        let t = at("2020-01-01");
        store
            .supersede(AttributeValue::new(parent(1), "party", "A"), t)
            .await
            .unwrap();
        store
            .supersede(AttributeValue::new(parent(1), "party", "B"), t)
            .await
            .unwrap();

        let history = store.history(&parent(1), "party").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["value"], "B");
    }

    #[tokio::test]
    async fn test_supersede_requires_parent_key() {
        let store = store().await;
        let value = AttributeValue::new(PrimaryKey::new(), "party", "A");
        let err = store.supersede(value, Instant::now()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArgument);
    }

    #[tokio::test]
    async fn test_languages_are_independent() {
        let store = store().await;
        store
            .supersede(
                AttributeValue::new(parent(1), "title", "poslanec").with_lang("cs"),
                at("2020-01-01"),
            )
            .await
            .unwrap();
        store
            .supersede(
                AttributeValue::new(parent(1), "title", "deputy").with_lang("en"),
                at("2021-01-01"),
            )
            .await
            .unwrap();

        let cs = store
            .read(&Filter::new().eq("lang", "cs").now())
            .await
            .unwrap();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0]["until"], "infinity");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        store
            .create(rows(json!({"mp_id": 1, "name": "email", "value": "x"})))
            .await
            .unwrap();
        let filter = Filter::new().eq("mp_id", 1);
        assert_eq!(store.delete(&filter).await.unwrap().len(), 1);
        assert!(store.delete(&filter).await.unwrap().is_empty());
    }
}
