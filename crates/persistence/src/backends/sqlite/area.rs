//! Area pattern store and address resolution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::area::{
    AreaOverlap, AreaPattern, EXCEPTION_PREFIX, WILDCARD, find_overlaps, query_fields,
};
use crate::core::TableStorage;
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::query::{SqlFragment, SqlParam, quote_ident, select_sql};
use crate::schema::{AREA_FIELDS, AreaSchema, CONSTITUENCY_COLUMN};
use crate::types::{Filter, LIMIT_KEY, OFFSET_KEY, PrimaryKey, Record, ensure_scalar, scalar_text};

use super::SqliteBackend;
use super::entity::EntityStore;
use super::rows::{check_data, query_records};

/// Store for area patterns plus the resolver that maps addresses onto them.
///
/// Writes behave like any fixed-schema table, except that omitted or null
/// address fields are stored as the wildcard. Reads interpret area-field
/// filter values as patterns; see [`AreaStore::read`](TableStorage::read).
#[derive(Debug, Clone)]
pub struct AreaStore {
    rows: EntityStore,
    schema: Arc<AreaSchema>,
}

/// Stores address fields as text, null meaning the wildcard.
fn normalize_field(column: &str, value: &Value) -> StorageResult<Value> {
    ensure_scalar(column, value)?;
    Ok(match value {
        Value::Null => Value::String(WILDCARD.to_string()),
        other => Value::String(scalar_text(other)),
    })
}

impl AreaStore {
    /// Creates a store for `schema` over `backend`.
    pub fn new(backend: SqliteBackend, schema: Arc<AreaSchema>) -> Self {
        let rows = EntityStore::new(backend, Arc::new(schema.entity_schema().clone()));
        Self { rows, schema }
    }

    /// The table description.
    pub fn schema(&self) -> &Arc<AreaSchema> {
        &self.schema
    }

    fn prepare_row(&self, mut row: Record) -> StorageResult<Record> {
        check_data(self.rows.schema(), &row)?;
        for field in AREA_FIELDS {
            let value = match row.get(field) {
                Some(value) => normalize_field(field, value)?,
                None => Value::String(WILDCARD.to_string()),
            };
            row.insert(field.to_string(), value);
        }
        Ok(row)
    }

    /// Loads every pattern compatible with the concrete `address`.
    ///
    /// Fields absent from the address can only be matched by a wildcard.
    /// Keys that are not address fields are ignored. The result is ordered by
    /// constituency.
    pub async fn resolve(&self, address: &Record) -> StorageResult<Vec<Record>> {
        let mut predicate = SqlFragment::default();
        for field in AREA_FIELDS {
            let column = quote_ident(field);
            let condition = match address.get(field) {
                None | Some(Value::Null) => SqlFragment::with_params(
                    format!("{} = ?", column),
                    vec![SqlParam::string(WILDCARD)],
                ),
                Some(value) => {
                    ensure_scalar(field, value)?;
                    SqlFragment::with_params(
                        format!("{c} = ? OR {c} = ? OR {c} LIKE ?", c = column),
                        vec![
                            SqlParam::string(scalar_text(value)),
                            SqlParam::string(WILDCARD),
                            SqlParam::string(format!("{}%", EXCEPTION_PREFIX)),
                        ],
                    )
                }
            };
            predicate = predicate.and(condition);
        }

        let schema = self.rows.schema();
        let mut compiled = self
            .rows
            .compiler()
            .compile(&Filter::new().order_by(CONSTITUENCY_COLUMN))?;
        compiled.predicate = predicate;
        let sql = select_sql(schema.table(), schema.columns(), &compiled);
        let candidates = {
            let conn = self.rows.backend().get_connection()?;
            query_records(&conn, &sql, schema.columns())?
        };

        let mut matches = Vec::new();
        for row in candidates {
            if AreaPattern::from_record(&row)?.matches_address(address) {
                matches.push(row);
            }
        }
        tracing::debug!(
            table = self.schema.table(),
            matches = matches.len(),
            "resolved address"
        );
        Ok(matches)
    }

    /// Returns the constituency owning `address`.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - If no pattern matches
    /// * `ResourceError::Ambiguous` - If matching patterns name different
    ///   constituencies
    pub async fn constituency_for(&self, address: &Record) -> StorageResult<Value> {
        let matches = self.resolve(address).await?;
        let mut ids: Vec<Value> = Vec::new();
        for row in &matches {
            let id = row.get(CONSTITUENCY_COLUMN).cloned().unwrap_or(Value::Null);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        match ids.len() {
            0 => Err(StorageError::Resource(ResourceError::NotFound {
                table: self.schema.table().to_string(),
                filter: Filter::from_map(address.clone()).describe(),
            })),
            1 => Ok(ids.remove(0)),
            _ => {
                let candidates: Vec<String> = ids.iter().map(scalar_text).collect();
                tracing::warn!(
                    table = self.schema.table(),
                    candidates = ?candidates,
                    "address matches patterns of several constituencies"
                );
                Err(StorageError::Resource(ResourceError::Ambiguous {
                    table: self.schema.table().to_string(),
                    candidates,
                }))
            }
        }
    }

    /// Lists pattern pairs of different constituencies that can both match
    /// one address.
    pub async fn overlaps(&self) -> StorageResult<Vec<AreaOverlap>> {
        let patterns = self
            .rows
            .read(&Filter::new())
            .await?
            .iter()
            .map(AreaPattern::from_record)
            .collect::<StorageResult<Vec<_>>>()?;

        let overlaps = find_overlaps(&patterns);
        for overlap in &overlaps {
            tracing::warn!(
                table = self.schema.table(),
                first = %overlap.first,
                second = %overlap.second,
                "overlapping area patterns"
            );
        }
        Ok(overlaps)
    }
}

#[async_trait]
impl TableStorage for AreaStore {
    fn table(&self) -> &str {
        self.schema.table()
    }

    /// Area-field values in `filter` are patterns themselves: a stored row is
    /// returned when, on every constrained field, the two patterns accept at
    /// least one common value. Other keys compare by equality. Paging applies
    /// after matching.
    async fn read(&self, filter: &Filter) -> StorageResult<Vec<Record>> {
        let query = query_fields(filter.conditions());
        let limit = filter.limit_value()?;
        let offset = filter.offset_value()?.unwrap_or(0);

        let mut stored = filter.clone();
        for field in AREA_FIELDS {
            stored.remove(field);
        }
        stored.remove(LIMIT_KEY);
        stored.remove(OFFSET_KEY);

        let mut matches = Vec::new();
        for row in self.rows.read(&stored).await? {
            if AreaPattern::from_record(&row)?.matches_query(&query) {
                matches.push(row);
            }
        }

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let page = matches.into_iter().skip(offset);
        Ok(match limit {
            Some(limit) => page.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
            None => page.collect(),
        })
    }

    async fn create(&self, rows: Vec<Record>) -> StorageResult<Vec<PrimaryKey>> {
        let rows = rows
            .into_iter()
            .map(|row| self.prepare_row(row))
            .collect::<StorageResult<Vec<_>>>()?;
        self.rows.insert_all(&rows)
    }

    async fn update(&self, filter: &Filter, data: Record) -> StorageResult<Vec<PrimaryKey>> {
        let mut data = data;
        for field in AREA_FIELDS {
            if let Some(value) = data.get(field) {
                let value = normalize_field(field, value)?;
                data.insert(field.to_string(), value);
            }
        }
        self.rows.update(filter, data).await
    }

    async fn delete(&self, filter: &Filter) -> StorageResult<Vec<PrimaryKey>> {
        self.rows.delete(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Catalog;
    use crate::types::records_from_json;
    use serde_json::json;

    async fn store() -> AreaStore {
        let schema = AreaSchema::new("area").unwrap();
        let mut catalog = Catalog::new();
        catalog.add_area(&schema).unwrap();
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema(&catalog).unwrap();
        AreaStore::new(backend, Arc::new(schema))
    }

    fn rows(value: Value) -> Vec<Record> {
        records_from_json(value).unwrap()
    }

    fn address(neighborhood: &str) -> Record {
        rows(json!({
            "country": "CZ",
            "administrative_area_level_1": "Hlavní město Praha",
            "administrative_area_level_2": "Hlavní město Praha",
            "administrative_area_level_3": "Praha",
            "locality": "Praha",
            "sublocality": "Praha 4",
            "neighborhood": neighborhood,
            "route": "Branická",
            "street_number": "44"
        }))
        .remove(0)
    }

    async fn seeded() -> AreaStore {
        let store = store().await;
        store
            .create(rows(json!([
                {"constituency_id": 21, "locality": "Praha", "sublocality": "Praha 4",
                 "neighborhood": "~Hodkovičky,Lhotka"},
                {"constituency_id": 22, "locality": "Praha", "sublocality": "Praha 4",
                 "neighborhood": "Hodkovičky"},
                {"constituency_id": 22, "locality": "Praha", "sublocality": "Praha 4",
                 "neighborhood": "Lhotka"},
                {"constituency_id": 60, "locality": "Brno"}
            ])))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_fills_wildcards() {
        let store = store().await;
        let keys = store
            .create(rows(json!({"constituency_id": 1, "street_number": 12})))
            .await
            .unwrap();
        assert_eq!(keys[0]["country"], "*");
        assert_eq!(keys[0]["street_number"], "12");

        let err = store
            .create(rows(json!({"constituency_id": 1, "postal_code": "14000"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_resolve_with_exception_sets() {
        let store = seeded().await;
        let found = store.resolve(&address("Braník")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0][CONSTITUENCY_COLUMN], 21);

        assert_eq!(store.constituency_for(&address("Hodkovičky")).await.unwrap(), json!(22));
        assert_eq!(store.constituency_for(&address("Braník")).await.unwrap(), json!(21));
    }

    #[tokio::test]
    async fn test_missing_address_field_needs_wildcard() {
        let store = seeded().await;
        let mut partial = address("Braník");
        partial.remove("neighborhood");
        let err = store.constituency_for(&partial).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_ambiguous_resolution() {
        let store = seeded().await;
        store
            .create(rows(json!({
                "constituency_id": 23, "locality": "Praha", "neighborhood": "Braník"
            })))
            .await
            .unwrap();
        let err = store.constituency_for(&address("Braník")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ambiguous);
        assert_eq!(store.resolve(&address("Braník")).await.unwrap().len(), 2);

        let overlaps = store.overlaps().await.unwrap();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].second.constituency_id, json!(23));
    }

    #[tokio::test]
    async fn test_read_matches_patterns() {
        let store = seeded().await;

        let found = store
            .read(&Filter::new().eq("neighborhood", "Lhotka"))
            .await
            .unwrap();
        let ids: Vec<&Value> = found.iter().map(|r| &r[CONSTITUENCY_COLUMN]).collect();
        // Brno's pattern has a wildcard neighborhood.
        assert_eq!(ids, vec![&json!(22), &json!(60)]);

        let found = store
            .read(&Filter::new().eq("neighborhood", "~Lhotka").eq("constituency_id", 22))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["neighborhood"], "Hodkovičky");

        let found = store
            .read(
                &Filter::new()
                    .eq("locality", "Praha")
                    .order_by("neighborhood desc")
                    .offset(1)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["neighborhood"], "Lhotka");

        let past_end = store.read(&Filter::new().offset(i64::MAX as u64)).await.unwrap();
        assert!(past_end.is_empty());
        let err = store.read(&Filter::new().limit(u64::MAX)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_update_and_delete_by_stored_value() {
        let store = seeded().await;
        let data = rows(json!({"neighborhood": null})).remove(0);
        let keys = store
            .update(&Filter::new().eq("neighborhood", "Lhotka"), data)
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["neighborhood"], "*");

        let filter = Filter::new().eq("constituency_id", 60);
        assert_eq!(store.delete(&filter).await.unwrap().len(), 1);
        assert!(store.delete(&filter).await.unwrap().is_empty());
        let left: Vec<Value> = store
            .read(&Filter::new().order_by(CONSTITUENCY_COLUMN))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r[CONSTITUENCY_COLUMN].clone())
            .collect();
        assert_eq!(left, vec![json!(21), json!(22), json!(22)]);
    }
}
