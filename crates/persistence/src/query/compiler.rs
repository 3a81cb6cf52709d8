//! Filter compiler.
//!
//! Turns a [`Filter`] into a conjunctive, parameterized predicate plus the
//! ordering and paging clauses. Column keys are passed through verbatim
//! (quoted) unless a qualifier maps them; values are always bound.

use crate::error::{StorageError, StorageResult};
use crate::types::{
    Filter, Instant, LIMIT_KEY, OFFSET_KEY, ORDER_KEY, SortDirective, ensure_scalar,
};

use super::fragment::{SqlFragment, SqlParam, quote_ident};

type Qualifier<'a> = Box<dyn Fn(&str) -> String + Send + Sync + 'a>;

/// The compiled form of a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// Conjunction of all conditions; empty matches every row.
    pub predicate: SqlFragment,
    /// Validated ordering.
    pub order: Vec<SortDirective>,
    /// Row limit.
    pub limit: Option<i64>,
    /// Row offset.
    pub offset: Option<i64>,
    /// Point-in-time selector, `now` already resolved.
    pub point_in_time: Option<Instant>,
}

impl CompiledFilter {
    /// Appends ` WHERE …` (or nothing for an empty predicate).
    pub fn push_where(&self, out: &mut SqlFragment) {
        if !self.predicate.is_empty() {
            out.push_sql(" WHERE ");
            out.append(self.predicate.clone());
        }
    }

    /// Appends ` ORDER BY …`, mapping each column through `expr`.
    pub fn push_order_by(&self, out: &mut SqlFragment, expr: impl Fn(&str) -> String) {
        if self.order.is_empty() {
            return;
        }
        let clauses: Vec<String> = self
            .order
            .iter()
            .map(|s| format!("{} {}", expr(&s.column), s.direction.as_sql()))
            .collect();
        out.push_sql(&format!(" ORDER BY {}", clauses.join(", ")));
    }

    /// Appends ` LIMIT ? OFFSET ?` with the bounds as the last two parameters.
    pub fn push_paging(&self, out: &mut SqlFragment) {
        if self.limit.is_none() && self.offset.is_none() {
            return;
        }
        // SQLite spells "no limit" as a negative limit.
        let limit = self.limit.unwrap_or(-1);
        let offset = self.offset.unwrap_or(0);
        out.push_sql(" LIMIT ? OFFSET ?");
        out.params.push(SqlParam::integer(limit));
        out.params.push(SqlParam::integer(offset));
    }

    /// Returns true if ordering or paging is present.
    pub fn has_paging(&self) -> bool {
        !self.order.is_empty() || self.limit.is_some() || self.offset.is_some()
    }
}

/// Compiles filters against one projection.
pub struct FilterCompiler<'a> {
    orderable: Vec<String>,
    qualifier: Option<Qualifier<'a>>,
    interval: Option<(String, String)>,
}

impl<'a> FilterCompiler<'a> {
    /// A compiler whose `_order` may only name `orderable` columns.
    pub fn new<I, S>(orderable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            orderable: orderable.into_iter().map(Into::into).collect(),
            qualifier: None,
            interval: None,
        }
    }

    /// Maps filter keys to SQL column expressions (default: quoted key).
    pub fn with_qualifier(mut self, qualifier: impl Fn(&str) -> String + Send + Sync + 'a) -> Self {
        self.qualifier = Some(Box::new(qualifier));
        self
    }

    /// Turns the point-in-time selector into `since <= t AND until > t`.
    pub fn with_interval(mut self, since: &str, until: &str) -> Self {
        self.interval = Some((since.to_string(), until.to_string()));
        self
    }

    fn column_expr(&self, key: &str) -> String {
        match &self.qualifier {
            Some(qualify) => qualify(key),
            None => quote_ident(key),
        }
    }

    /// Compiles `filter`.
    pub fn compile(&self, filter: &Filter) -> StorageResult<CompiledFilter> {
        let mut predicate = SqlFragment::default();

        for (key, value) in filter.conditions() {
            ensure_scalar(key, value)?;
            let column = self.column_expr(key);
            let condition = if value.is_null() {
                SqlFragment::new(format!("{} IS NULL", column))
            } else {
                SqlFragment::with_params(
                    format!("{} = ?", column),
                    vec![SqlParam::from_json(key, value)?],
                )
            };
            predicate = predicate.and(condition);
        }

        let point_in_time = filter.point_in_time()?;
        if let (Some(t), Some((since, until))) = (&point_in_time, &self.interval) {
            let text = t.to_sql_text();
            predicate = predicate.and(SqlFragment::with_params(
                format!(
                    "{} <= ? AND {} > ?",
                    self.column_expr(since),
                    self.column_expr(until)
                ),
                vec![SqlParam::string(&text), SqlParam::string(&text)],
            ));
        }

        let order = filter.sort()?;
        if let Some(unknown) = order.iter().find(|s| !self.orderable.contains(&s.column)) {
            return Err(StorageError::invalid_argument(
                ORDER_KEY,
                format!("cannot order by unknown column '{}'", unknown.column),
            ));
        }

        Ok(CompiledFilter {
            predicate,
            order,
            limit: sql_bound(LIMIT_KEY, filter.limit_value()?)?,
            offset: sql_bound(OFFSET_KEY, filter.offset_value()?)?,
            point_in_time,
        })
    }
}

fn sql_bound(key: &str, value: Option<u64>) -> StorageResult<Option<i64>> {
    value
        .map(|v| {
            i64::try_from(v).map_err(|_| {
                StorageError::invalid_argument(key, format!("{} is out of range", v))
            })
        })
        .transpose()
}

/// Renders `SELECT columns FROM table [WHERE] [ORDER BY] [LIMIT ? OFFSET ?]`.
pub fn select_sql(table: &str, columns: &[String], compiled: &CompiledFilter) -> SqlFragment {
    let list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let mut out = SqlFragment::new(format!(
        "SELECT {} FROM {}",
        list.join(", "),
        quote_ident(table)
    ));
    compiled.push_where(&mut out);
    compiled.push_order_by(&mut out, quote_ident);
    compiled.push_paging(&mut out);
    out
}

/// Renders the row selection used by update/delete.
///
/// Without ordering or paging this is the plain predicate; otherwise rows are
/// picked through `rowid IN (SELECT rowid … ORDER BY … LIMIT …)`.
pub fn target_rows_sql(table: &str, compiled: &CompiledFilter) -> SqlFragment {
    if !compiled.has_paging() {
        let mut out = SqlFragment::default();
        compiled.push_where(&mut out);
        return out;
    }
    let mut inner = SqlFragment::new(format!("SELECT rowid FROM {}", quote_ident(table)));
    compiled.push_where(&mut inner);
    compiled.push_order_by(&mut inner, quote_ident);
    compiled.push_paging(&mut inner);

    let mut out = SqlFragment::new(" WHERE rowid IN (");
    out.append(inner);
    out.push_sql(")");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::SortDirection;
    use serde_json::json;

    fn columns() -> Vec<String> {
        ["id", "name", "since", "until"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let compiled = FilterCompiler::new(columns()).compile(&Filter::new()).unwrap();
        assert!(compiled.predicate.is_empty());
        let sql = select_sql("mp", &columns(), &compiled);
        assert_eq!(sql.sql, "SELECT \"id\", \"name\", \"since\", \"until\" FROM \"mp\"");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_equality_conditions_are_bound() {
        let filter = Filter::new().eq("id", 4).eq("name", "x' OR 1=1 --");
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        assert_eq!(compiled.predicate.sql, "(\"id\" = ?) AND (\"name\" = ?)");
        assert_eq!(
            compiled.predicate.params,
            vec![SqlParam::Integer(4), SqlParam::string("x' OR 1=1 --")]
        );
    }

    #[test]
    fn test_null_compiles_to_is_null() {
        let filter = Filter::from_json(json!({"name": null})).unwrap();
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        assert_eq!(compiled.predicate.sql, "\"name\" IS NULL");
        assert!(compiled.predicate.params.is_empty());
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let filter = Filter::new().eq("nickname", "Bob");
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        assert_eq!(compiled.predicate.sql, "\"nickname\" = ?");
    }

    #[test]
    fn test_order_restricted_to_known_columns() {
        let filter = Filter::new().order_by("name desc");
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        assert_eq!(compiled.order[0].direction, SortDirection::Descending);

        let filter = Filter::new().order_by("password");
        let err = FilterCompiler::new(columns()).compile(&filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_paging_parameters_come_last() {
        let filter = Filter::new().eq("name", "A").order_by("id").limit(10).offset(5);
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        let sql = select_sql("mp", &columns(), &compiled);
        assert!(sql.sql.ends_with(" WHERE \"name\" = ? ORDER BY \"id\" ASC LIMIT ? OFFSET ?"));
        assert_eq!(
            sql.params,
            vec![
                SqlParam::string("A"),
                SqlParam::Integer(10),
                SqlParam::Integer(5)
            ]
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let compiled = FilterCompiler::new(columns())
            .compile(&Filter::new().offset(3))
            .unwrap();
        let mut out = SqlFragment::default();
        compiled.push_paging(&mut out);
        assert_eq!(out.params, vec![SqlParam::Integer(-1), SqlParam::Integer(3)]);
    }

    #[test]
    fn test_malformed_limit_fails() {
        let filter = Filter::from_json(json!({"_limit": "all"})).unwrap();
        let err = FilterCompiler::new(columns()).compile(&filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_limit_beyond_sqlite_range_fails() {
        let filter = Filter::new().limit(u64::MAX);
        let err = FilterCompiler::new(columns()).compile(&filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let filter = Filter::from_json(json!({"_offset": "9223372036854775808"})).unwrap();
        assert!(FilterCompiler::new(columns()).compile(&filter).is_err());

        let compiled = FilterCompiler::new(columns())
            .compile(&Filter::new().limit(i64::MAX as u64))
            .unwrap();
        assert_eq!(compiled.limit, Some(i64::MAX));
    }

    #[test]
    fn test_non_scalar_value_fails() {
        let filter = Filter::from_json(json!({"name": ["a", "b"]})).unwrap();
        let err = FilterCompiler::new(columns()).compile(&filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_interval_selector() {
        let filter = Filter::new().eq("name", "party").at(Instant::parse("2020-01-01").unwrap());
        let compiled = FilterCompiler::new(columns())
            .with_interval("since", "until")
            .compile(&filter)
            .unwrap();
        assert_eq!(
            compiled.predicate.sql,
            "(\"name\" = ?) AND (\"since\" <= ? AND \"until\" > ?)"
        );
        assert_eq!(compiled.predicate.params[1], SqlParam::string("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_selector_ignored_without_interval() {
        let filter = Filter::new().now();
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        assert!(compiled.predicate.is_empty());
        assert!(compiled.point_in_time.is_some());
    }

    #[test]
    fn test_qualifier() {
        let filter = Filter::new().eq("name", "A");
        let compiled = FilterCompiler::new(columns())
            .with_qualifier(|k| format!("\"t\".{}", quote_ident(k)))
            .compile(&filter)
            .unwrap();
        assert_eq!(compiled.predicate.sql, "\"t\".\"name\" = ?");
    }

    #[test]
    fn test_target_rows_with_paging() {
        let filter = Filter::new().eq("name", "A").limit(1);
        let compiled = FilterCompiler::new(columns()).compile(&filter).unwrap();
        let target = target_rows_sql("mp", &compiled);
        assert_eq!(
            target.sql,
            " WHERE rowid IN (SELECT rowid FROM \"mp\" WHERE \"name\" = ? LIMIT ? OFFSET ?)"
        );
        assert_eq!(target.params.len(), 3);
    }
}
