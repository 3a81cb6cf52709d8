//! SQL fragments with bound parameters.
//!
//! Fragments use anonymous `?` placeholders, so parameters bind in the order
//! their placeholders appear in the text. Combining fragments keeps that
//! order as long as `params` are appended in the same order as `sql`.

use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }

    /// Converts a scalar JSON value; booleans become 0/1.
    pub fn from_json(column: &str, value: &Value) -> StorageResult<Self> {
        match value {
            Value::Null => Ok(SqlParam::Null),
            Value::Bool(b) => Ok(SqlParam::Integer(i64::from(*b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlParam::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlParam::Float(f))
                } else {
                    Err(StorageError::invalid_argument(
                        column,
                        format!("number {} does not fit a column", n),
                    ))
                }
            }
            Value::String(s) => Ok(SqlParam::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(StorageError::invalid_argument(
                column,
                "only scalar values can be stored or compared",
            )),
        }
    }
}

#[cfg(feature = "sqlite")]
impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            SqlParam::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            SqlParam::Null => ToSqlOutput::Borrowed(ValueRef::Null),
        })
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Adds a parameter and returns its placeholder.
    pub fn add_param(&mut self, param: SqlParam) -> &'static str {
        self.params.push(param);
        "?"
    }

    /// Appends raw SQL text.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends another fragment verbatim.
    pub fn append(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Quotes an identifier for SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders a scalar as a SQL literal (DDL defaults only).
pub fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => i64::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_fragment() {
        let mut frag = SqlFragment::new("");
        let placeholder = frag.add_param(SqlParam::string("test"));
        frag.push_sql(&format!("value = {}", placeholder));

        assert!(!frag.is_empty());
        assert_eq!(frag.sql, "value = ?");
        assert_eq!(frag.params.len(), 1);
    }

    #[test]
    fn test_fragment_and() {
        let frag1 = SqlFragment::with_params("a = ?", vec![SqlParam::string("x")]);
        let frag2 = SqlFragment::with_params("b = ?", vec![SqlParam::string("y")]);

        let combined = frag1.and(frag2);
        assert_eq!(combined.sql, "(a = ?) AND (b = ?)");
        assert_eq!(
            combined.params,
            vec![SqlParam::string("x"), SqlParam::string("y")]
        );
    }

    #[test]
    fn test_fragment_and_with_empty() {
        let combined = SqlFragment::new("").and(SqlFragment::new("b = 1"));
        assert_eq!(combined.sql, "b = 1");
    }

    #[test]
    fn test_param_from_json() {
        assert_eq!(
            SqlParam::from_json("x", &json!(true)).unwrap(),
            SqlParam::Integer(1)
        );
        assert_eq!(
            SqlParam::from_json("x", &json!(1.5)).unwrap(),
            SqlParam::Float(1.5)
        );
        assert_eq!(SqlParam::from_json("x", &json!(null)).unwrap(), SqlParam::Null);
        assert!(SqlParam::from_json("x", &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal(&json!("O'Neil")), "'O''Neil'");
        assert_eq!(quote_literal(&json!(3)), "3");
    }
}
