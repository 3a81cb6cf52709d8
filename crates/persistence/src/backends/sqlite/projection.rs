//! Joined projections over several tables with a translation overlay.
//!
//! A projection left-joins a chain of fixed-schema tables and exposes every
//! column as `<entity>_<column>`. When a language is requested, each non-key
//! column of an entity that has an attribute table is joined once more
//! against that table (one alias per column), and the translated value is
//! exposed as `<entity>_<column>_<lang>`. Rows without a translation simply
//! lack that key.
//!
//! The joined rows are wrapped in a subquery, so the caller's filter and
//! `_order` address the exposed names:
//!
//! ```sql
//! SELECT "mp_id", "mp_last_name", "mp_last_name_en" FROM (
//!     SELECT "mp"."id" AS "mp_id", …, "mp__last_name"."value" AS "mp_last_name_en"
//!     FROM "mp" AS "mp"
//!     LEFT JOIN "mp_attribute" AS "mp__last_name" ON … AND "mp__last_name"."lang" = ?
//! ) AS "projection" WHERE "mp_last_name" = ? LIMIT ? OFFSET ?
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::query::{FilterCompiler, SqlFragment, SqlParam, quote_ident};
use crate::schema::{AttributeSchema, DEFAULT_PARL, EntitySchema, validate_identifier};
use crate::types::{Filter, Instant, Record};

use super::SqliteBackend;
use super::rows::query_records;

const PROJECTION_ALIAS: &str = "projection";

/// `column = other_entity.other_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    /// Column of the entity being joined.
    pub column: String,
    /// An entity joined earlier.
    pub entity: String,
    /// Column of that earlier entity.
    pub other_column: String,
}

/// One table taking part in a projection.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    schema: Arc<EntitySchema>,
    joins: Vec<JoinCondition>,
    filter: Filter,
    translations: Option<Arc<AttributeSchema>>,
}

impl EntityDescriptor {
    /// Describes `schema` under its table name.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        let name = schema.table().to_string();
        Self::named(name, schema)
    }

    /// Describes `schema` under an explicit entity name (its prefix).
    pub fn named(name: impl Into<String>, schema: Arc<EntitySchema>) -> Self {
        Self {
            name: name.into(),
            schema,
            joins: Vec::new(),
            filter: Filter::new(),
            translations: None,
        }
    }

    /// Joins on `column = entity.other_column`; several calls are AND-ed.
    pub fn join_on(
        mut self,
        column: impl Into<String>,
        entity: impl Into<String>,
        other_column: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinCondition {
            column: column.into(),
            entity: entity.into(),
            other_column: other_column.into(),
        });
        self
    }

    /// Extra equality conditions on this entity's own columns.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// The attribute table holding translations of this entity's columns.
    pub fn translated_by(mut self, attributes: Arc<AttributeSchema>) -> Self {
        self.translations = Some(attributes);
        self
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn exposed(&self, column: &str) -> String {
        format!("{}_{}", self.name, column)
    }

    fn alias(&self) -> String {
        quote_ident(&self.name)
    }

    fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.alias(), quote_ident(column))
    }

    fn translatable(&self) -> impl Iterator<Item = &String> {
        self.schema.non_key_columns()
    }
}

/// Collects entity descriptors and validates them into a [`Projection`].
#[derive(Debug, Clone)]
pub struct ProjectionBuilder {
    backend: SqliteBackend,
    entities: Vec<EntityDescriptor>,
}

impl ProjectionBuilder {
    /// Starts an empty projection.
    pub fn new(backend: SqliteBackend) -> Self {
        Self {
            backend,
            entities: Vec::new(),
        }
    }

    /// Appends an entity; the first one is the base of the join chain.
    pub fn entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validates the join chain.
    ///
    /// # Errors
    ///
    /// * `ValidationError::MissingArgument` - If no entity was declared
    /// * `ValidationError::InvalidArgument` - If names clash or a join refers
    ///   to an unknown entity or column
    pub fn build(self) -> StorageResult<Projection> {
        if self.entities.is_empty() {
            return Err(StorageError::missing_argument("entities"));
        }

        let mut columns: Vec<String> = Vec::new();
        for (i, entity) in self.entities.iter().enumerate() {
            validate_identifier(&entity.name)?;
            if entity.name.contains(ALIAS_SEPARATOR) {
                return Err(StorageError::invalid_argument(
                    &entity.name,
                    format!("entity names may not contain '{}'", ALIAS_SEPARATOR),
                ));
            }
            if self.entities[..i].iter().any(|e| e.name == entity.name) {
                return Err(StorageError::invalid_argument(
                    &entity.name,
                    "entity declared twice in projection",
                ));
            }
            if i == 0 && !entity.joins.is_empty() {
                return Err(StorageError::invalid_argument(
                    &entity.name,
                    "the base entity cannot have a join condition",
                ));
            }

            for join in &entity.joins {
                let other = self.entities[..i]
                    .iter()
                    .find(|e| e.name == join.entity)
                    .ok_or_else(|| {
                        StorageError::invalid_argument(
                            &join.entity,
                            format!("'{}' joins an entity not declared before it", entity.name),
                        )
                    })?;
                if !entity.schema.has_column(&join.column) {
                    return Err(StorageError::invalid_argument(
                        &join.column,
                        format!("not a column of '{}'", entity.name),
                    ));
                }
                if !other.schema.has_column(&join.other_column) {
                    return Err(StorageError::invalid_argument(
                        &join.other_column,
                        format!("not a column of '{}'", other.name),
                    ));
                }
            }

            if let Some(attributes) = &entity.translations {
                if attributes.parent_key().len() != entity.schema.primary_key().len() {
                    return Err(StorageError::invalid_argument(
                        attributes.table(),
                        format!("parent key does not match the key of '{}'", entity.name),
                    ));
                }
            }

            for column in entity.schema.columns() {
                let exposed = entity.exposed(column);
                if columns.contains(&exposed) {
                    return Err(StorageError::invalid_argument(
                        exposed,
                        "exposed column name produced twice",
                    ));
                }
                columns.push(exposed);
            }
        }

        Ok(Projection {
            backend: self.backend,
            entities: self.entities,
            columns,
        })
    }
}

/// A validated, reusable joined projection.
#[derive(Debug, Clone)]
pub struct Projection {
    backend: SqliteBackend,
    entities: Vec<EntityDescriptor>,
    columns: Vec<String>,
}

/// Rendered statement plus its output layout.
struct Rendered {
    sql: SqlFragment,
    columns: Vec<String>,
    translated: Vec<String>,
}

impl Projection {
    /// Exposed (prefixed) columns, without translations.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn base(&self) -> &EntityDescriptor {
        &self.entities[0]
    }

    /// Reads the projection.
    ///
    /// Filter keys naming a column of the base entity are qualified to it;
    /// other keys must use exposed names. Translations are taken at the
    /// filter's point in time, or now.
    pub async fn read(&self, filter: &Filter, lang: Option<&str>) -> StorageResult<Vec<Record>> {
        let rendered = self.render(filter, lang)?;
        let rows = {
            let conn = self.backend.get_connection()?;
            query_records(&conn, &rendered.sql, &rendered.columns)?
        };

        Ok(rows
            .into_iter()
            .map(|mut row| {
                for column in &rendered.translated {
                    if row.get(column).is_some_and(Value::is_null) {
                        row.remove(column);
                    }
                }
                row
            })
            .collect())
    }

    fn render(&self, filter: &Filter, lang: Option<&str>) -> StorageResult<Rendered> {
        let mut columns = self.columns.clone();
        let mut select_list: Vec<String> = Vec::new();
        for entity in &self.entities {
            for column in entity.schema.columns() {
                select_list.push(format!(
                    "{} AS {}",
                    entity.qualified(column),
                    quote_ident(&entity.exposed(column))
                ));
            }
        }

        let base = self.base();
        let mut translated = Vec::new();
        let mut translation_columns = Vec::new();
        if let Some(lang) = lang {
            for entity in &self.entities {
                if entity.translations.is_none() {
                    continue;
                }
                for column in entity.translatable() {
                    let exposed = format!("{}_{}", entity.exposed(column), lang);
                    if columns.contains(&exposed) {
                        return Err(StorageError::invalid_argument(
                            exposed,
                            "translated column clashes with an exposed column",
                        ));
                    }
                    select_list.push(format!(
                        "{}.{} AS {}",
                        quote_ident(&translation_alias(entity, column)),
                        quote_ident("value"),
                        quote_ident(&exposed)
                    ));
                    columns.push(exposed.clone());
                    translated.push(exposed);
                    translation_columns.push((entity, column));
                }
            }
        }

        let base_name = base.name.clone();
        let base_schema = base.schema.clone();
        let compiled = FilterCompiler::new(columns.iter().cloned())
            .with_qualifier(move |key| {
                if base_schema.has_column(key) {
                    quote_ident(&format!("{}_{}", base_name, key))
                } else {
                    quote_ident(key)
                }
            })
            .compile(filter)?;
        let at = compiled.point_in_time.unwrap_or_else(Instant::now).to_sql_text();

        let mut inner = SqlFragment::new(format!(
            "SELECT {} FROM {} AS {}",
            select_list.join(", "),
            quote_ident(base.schema.table()),
            base.alias()
        ));

        for entity in &self.entities[1..] {
            let mut on = SqlFragment::default();
            for join in &entity.joins {
                on = on.and(SqlFragment::new(format!(
                    "{} = {}.{}",
                    entity.qualified(&join.column),
                    quote_ident(&join.entity),
                    quote_ident(&join.other_column)
                )));
            }
            on = on.and(entity_conditions(entity)?);
            if on.is_empty() {
                on = SqlFragment::new("1");
            }
            inner.push_sql(&format!(
                " LEFT JOIN {} AS {} ON ",
                quote_ident(entity.schema.table()),
                entity.alias()
            ));
            inner.append(on);
        }

        if let Some(lang) = lang {
            for (entity, column) in translation_columns {
                if let Some(attributes) = &entity.translations {
                    inner.append(translation_join(entity, attributes, column, lang, &at));
                }
            }
        }

        let base_conditions = entity_conditions(base)?;
        if !base_conditions.is_empty() {
            inner.push_sql(" WHERE ");
            inner.append(base_conditions);
        }

        let list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let mut sql = SqlFragment::new(format!("SELECT {} FROM (", list.join(", ")));
        sql.append(inner);
        sql.push_sql(&format!(") AS {}", quote_ident(PROJECTION_ALIAS)));
        compiled.push_where(&mut sql);
        compiled.push_order_by(&mut sql, quote_ident);
        compiled.push_paging(&mut sql);

        Ok(Rendered {
            sql,
            columns,
            translated,
        })
    }
}

/// Joins an entity name and a column into a translation alias.
const ALIAS_SEPARATOR: &str = "__";

fn translation_alias(entity: &EntityDescriptor, column: &str) -> String {
    format!("{}{}{}", entity.name, ALIAS_SEPARATOR, column)
}

/// The per-entity extra filter, qualified to the entity's alias.
fn entity_conditions(entity: &EntityDescriptor) -> StorageResult<SqlFragment> {
    if entity.filter.is_empty() {
        return Ok(SqlFragment::default());
    }
    let alias = entity.alias();
    let compiled = FilterCompiler::new(entity.schema.columns().iter().cloned())
        .with_qualifier(move |key| format!("{}.{}", alias, quote_ident(key)))
        .compile(&entity.filter)?;
    Ok(compiled.predicate)
}

fn translation_join(
    entity: &EntityDescriptor,
    attributes: &AttributeSchema,
    column: &str,
    lang: &str,
    at: &str,
) -> SqlFragment {
    let alias = quote_ident(&translation_alias(entity, column));
    let attr = |c: &str| format!("{}.{}", alias, quote_ident(c));

    let keys: Vec<String> = attributes
        .parent_key()
        .iter()
        .zip(entity.schema.primary_key())
        .map(|(parent, key)| format!("{} = {}", attr(parent), entity.qualified(key)))
        .collect();

    let mut join = SqlFragment::new(format!(
        " LEFT JOIN {} AS {} ON {}",
        quote_ident(attributes.table()),
        alias,
        keys.join(" AND ")
    ));
    join.push_sql(&format!(
        " AND {} = ? AND {} = ? AND {} = ? AND {} <= ? AND {} > ?",
        attr("name"),
        attr("lang"),
        attr("parl"),
        attr("since"),
        attr("until")
    ));
    join.params.extend([
        SqlParam::string(column),
        SqlParam::string(lang),
        SqlParam::string(DEFAULT_PARL),
        SqlParam::string(at),
        SqlParam::string(at),
    ]);
    join
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AttributeValue, TableStorage, TemporalStorage};
    use crate::error::ErrorKind;
    use crate::schema::Catalog;
    use crate::types::records_from_json;
    use serde_json::json;

    use super::super::{AttributeStore, EntityStore};

    struct Fixture {
        backend: SqliteBackend,
        mp: Arc<EntitySchema>,
        mp_attrs: Arc<AttributeSchema>,
        group: Arc<EntitySchema>,
    }

    async fn fixture() -> Fixture {
        let group = EntitySchema::builder("group")
            .columns(["id", "name"])
            .primary_key(["id"])
            .serial("id")
            .build()
            .unwrap();
        let mp = EntitySchema::builder("mp")
            .columns(["id", "last_name", "group_id"])
            .primary_key(["id"])
            .serial("id")
            .build()
            .unwrap();
        let mp_attrs = AttributeSchema::for_entity(&mp, "mp_attribute").unwrap();

        let mut catalog = Catalog::new();
        catalog.add_entity(&group).unwrap();
        catalog.add_entity(&mp).unwrap();
        catalog.add_attribute(&mp_attrs).unwrap();

        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema(&catalog).unwrap();

        let fixture = Fixture {
            backend,
            mp: Arc::new(mp),
            mp_attrs: Arc::new(mp_attrs),
            group: Arc::new(group),
        };

        let groups = EntityStore::new(fixture.backend.clone(), fixture.group.clone());
        groups
            .create(records_from_json(json!([{"name": "ODS"}, {"name": "ANO"}])).unwrap())
            .await
            .unwrap();
        let mps = EntityStore::new(fixture.backend.clone(), fixture.mp.clone());
        mps.create(
            records_from_json(json!([
                {"last_name": "Fiala", "group_id": 1},
                {"last_name": "Babiš", "group_id": 2},
                {"last_name": "Nezařazený"}
            ]))
            .unwrap(),
        )
        .await
        .unwrap();

        let attrs = AttributeStore::new(fixture.backend.clone(), fixture.mp_attrs.clone());
        let parent = json!({"mp_id": 1}).as_object().cloned().unwrap();
        attrs
            .supersede(
                AttributeValue::new(parent, "last_name", "Fiala (en)").with_lang("en"),
                Instant::parse("2020-01-01").unwrap(),
            )
            .await
            .unwrap();

        fixture
    }

    fn projection(f: &Fixture) -> Projection {
        ProjectionBuilder::new(f.backend.clone())
            .entity(EntityDescriptor::new(f.mp.clone()).translated_by(f.mp_attrs.clone()))
            .entity(EntityDescriptor::new(f.group.clone()).join_on("id", "mp", "group_id"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_zero_entities_is_missing_argument() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = ProjectionBuilder::new(backend).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArgument);
    }

    #[tokio::test]
    async fn test_join_must_reference_earlier_entity() {
        let f = fixture().await;
        let err = ProjectionBuilder::new(f.backend.clone())
            .entity(EntityDescriptor::new(f.mp.clone()))
            .entity(EntityDescriptor::new(f.group.clone()).join_on("id", "party", "id"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_entity_name_with_alias_separator_rejected() {
        let f = fixture().await;
        let err = ProjectionBuilder::new(f.backend.clone())
            .entity(EntityDescriptor::new(f.mp.clone()).translated_by(f.mp_attrs.clone()))
            .entity(EntityDescriptor::named("mp__last", f.group.clone()).join_on("id", "mp", "group_id"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("mp__last"));
    }

    #[tokio::test]
    async fn test_prefixed_left_join() {
        let f = fixture().await;
        let rows = projection(&f)
            .read(&Filter::new().order_by("mp_id"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["mp_last_name"], "Fiala");
        assert_eq!(rows[0]["group_name"], "ODS");
        assert_eq!(rows[2]["group_name"], Value::Null);
        assert!(!rows[0].contains_key("mp_last_name_en"));
    }

    #[tokio::test]
    async fn test_translation_overlay_omits_missing_values() {
        let f = fixture().await;
        let rows = projection(&f)
            .read(&Filter::new().order_by("mp_id"), Some("en"))
            .await
            .unwrap();
        assert_eq!(rows[0]["mp_last_name_en"], "Fiala (en)");
        assert!(!rows[1].contains_key("mp_last_name_en"));
        assert!(!rows[0].contains_key("mp_group_id_en"));

        // Before the translation existed.
        let rows = projection(&f)
            .read(&Filter::new().eq("id", 1).at(Instant::parse("2019-01-01").unwrap()), Some("en"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains_key("mp_last_name_en"));
    }

    #[tokio::test]
    async fn test_base_columns_are_qualified() {
        let f = fixture().await;
        // `id` exists in both tables; it means the base entity's id.
        let rows = projection(&f)
            .read(&Filter::new().eq("id", 2), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["mp_last_name"], "Babiš");

        let rows = projection(&f)
            .read(&Filter::new().eq("group_name", "ODS"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_order_restricted_to_exposed_columns() {
        let f = fixture().await;
        let err = projection(&f)
            .read(&Filter::new().order_by("last_name"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let rows = projection(&f)
            .read(&Filter::new().order_by("mp_last_name_en desc").limit(1), Some("en"))
            .await
            .unwrap();
        assert_eq!(rows[0]["mp_last_name_en"], "Fiala (en)");
    }

    #[tokio::test]
    async fn test_per_entity_filter_keeps_left_join() {
        let f = fixture().await;
        let projection = ProjectionBuilder::new(f.backend.clone())
            .entity(EntityDescriptor::new(f.mp.clone()))
            .entity(
                EntityDescriptor::new(f.group.clone())
                    .join_on("id", "mp", "group_id")
                    .filter(Filter::new().eq("name", "ANO")),
            )
            .build()
            .unwrap();
        let rows = projection
            .read(&Filter::new().order_by("mp_id"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["group_name"], Value::Null);
        assert_eq!(rows[1]["group_name"], "ANO");
    }
}
