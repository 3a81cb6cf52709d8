//! Filter maps: column equality conditions plus reserved control keys.
//!
//! A filter arrives as a decoded query string or request body, i.e. a flat
//! JSON object. Keys are column names compared by equality, except for the
//! reserved keys below which control ordering, paging and point-in-time
//! selection. Reserved values are only interpreted when a filter is
//! compiled, so malformed values surface as `InvalidArgument` at that point.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

use super::instant::{Instant, NOW};
use super::record::scalar_text;

/// Ordering key: comma-separated columns, each optionally suffixed `asc`/`desc`.
pub const ORDER_KEY: &str = "_order";

/// Maximum number of rows to return.
pub const LIMIT_KEY: &str = "_limit";

/// Number of rows to skip.
pub const OFFSET_KEY: &str = "_offset";

/// Point-in-time selector keys (both spellings are accepted).
pub const DATETIME_KEYS: [&str; 2] = ["#datetime", "_datetime"];

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

impl SortDirection {
    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// A sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    /// The column to sort by.
    pub column: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortDirective {
    /// Parses one ordering item (e.g., `"name desc"`).
    pub fn parse(s: &str) -> StorageResult<Self> {
        let mut parts = s.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| StorageError::invalid_argument(ORDER_KEY, "empty ordering item"))?;
        let direction = match parts.next().map(|d| d.to_ascii_lowercase()) {
            None => SortDirection::Ascending,
            Some(d) if d == "asc" => SortDirection::Ascending,
            Some(d) if d == "desc" => SortDirection::Descending,
            Some(d) => {
                return Err(StorageError::invalid_argument(
                    ORDER_KEY,
                    format!("unknown sort direction '{}'", d),
                ));
            }
        };
        if parts.next().is_some() {
            return Err(StorageError::invalid_argument(
                ORDER_KEY,
                format!("malformed ordering item '{}'", s),
            ));
        }
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

/// A filter map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    entries: Map<String, Value>,
}

impl Filter {
    /// An empty filter, matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already-decoded JSON object.
    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    /// Builds a filter from a decoded request (`null` means no filter).
    pub fn from_json(value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            Value::Null => Ok(Self::new()),
            other => Err(StorageError::invalid_argument(
                "filter",
                format!("expected an object, got {}", other),
            )),
        }
    }

    /// Adds an equality condition.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(column.into(), value.into());
        self
    }

    /// Appends an ordering item such as `"since desc"`.
    pub fn order_by(mut self, item: &str) -> Self {
        let merged = match self.entries.get(ORDER_KEY) {
            Some(Value::String(existing)) if !existing.is_empty() => {
                format!("{},{}", existing, item)
            }
            _ => item.to_string(),
        };
        self.entries.insert(ORDER_KEY.to_string(), Value::String(merged));
        self
    }

    /// Sets the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.entries.insert(LIMIT_KEY.to_string(), Value::from(limit));
        self
    }

    /// Sets the row offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.entries.insert(OFFSET_KEY.to_string(), Value::from(offset));
        self
    }

    /// Selects the versions valid at `instant`.
    pub fn at(mut self, instant: Instant) -> Self {
        self.entries.insert(
            DATETIME_KEYS[0].to_string(),
            Value::String(instant.to_sql_text()),
        );
        self
    }

    /// Selects the versions valid now.
    pub fn now(mut self) -> Self {
        self.entries
            .insert(DATETIME_KEYS[0].to_string(), Value::String(NOW.to_string()));
        self
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Inserts or replaces a raw entry.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Removes a raw entry.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Returns true if the filter has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true for the reserved control keys.
    pub fn is_reserved(key: &str) -> bool {
        key == ORDER_KEY || key == LIMIT_KEY || key == OFFSET_KEY || DATETIME_KEYS.contains(&key)
    }

    /// Iterates over the equality conditions, skipping reserved keys.
    pub fn conditions(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().filter(|(k, _)| !Self::is_reserved(k))
    }

    /// Parses `_order`.
    pub fn sort(&self) -> StorageResult<Vec<SortDirective>> {
        let items: Vec<String> = match self.entries.get(ORDER_KEY) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::String(s)) => s.split(',').map(|i| i.to_string()).collect(),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(StorageError::invalid_argument(
                        ORDER_KEY,
                        format!("expected a column name, got {}", other),
                    )),
                })
                .collect::<StorageResult<_>>()?,
            Some(other) => {
                return Err(StorageError::invalid_argument(
                    ORDER_KEY,
                    format!("expected a string or an array, got {}", other),
                ));
            }
        };

        items
            .iter()
            .filter(|i| !i.trim().is_empty())
            .map(|i| SortDirective::parse(i))
            .collect()
    }

    /// Parses `_limit`.
    pub fn limit_value(&self) -> StorageResult<Option<u64>> {
        self.numeric(LIMIT_KEY)
    }

    /// Parses `_offset`.
    pub fn offset_value(&self) -> StorageResult<Option<u64>> {
        self.numeric(OFFSET_KEY)
    }

    /// Parses the point-in-time selector, resolving `now`.
    pub fn point_in_time(&self) -> StorageResult<Option<Instant>> {
        for key in DATETIME_KEYS {
            match self.entries.get(key) {
                None | Some(Value::Null) => continue,
                Some(value) => return Instant::from_json(value).map(Some),
            }
        }
        Ok(None)
    }

    fn numeric(&self, key: &str) -> StorageResult<Option<u64>> {
        let value = match self.entries.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };
        // SQLite integers are signed 64-bit.
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .filter(|n| i64::try_from(*n).is_ok());
        parsed.map(Some).ok_or_else(|| {
            StorageError::invalid_argument(
                key,
                format!("expected a non-negative integer, got {}", value),
            )
        })
    }

    /// A compact rendering for error messages.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .conditions()
            .map(|(k, v)| format!("{}={}", k, scalar_text(v)))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(entries: Map<String, Value>) -> Self {
        Self::from_map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_conditions_skip_reserved_keys() {
        let filter = Filter::new()
            .eq("name", "Ann")
            .order_by("name desc")
            .limit(5)
            .now();
        let keys: Vec<&String> = filter.conditions().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name"]);
    }

    #[test]
    fn test_sort_parsing() {
        let filter = Filter::from_json(json!({"_order": "last_name, first_name DESC"})).unwrap();
        let sort = filter.sort().unwrap();
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0].column, "last_name");
        assert_eq!(sort[0].direction, SortDirection::Ascending);
        assert_eq!(sort[1].column, "first_name");
        assert_eq!(sort[1].direction, SortDirection::Descending);

        let filter = Filter::from_json(json!({"_order": ["since desc"]})).unwrap();
        assert_eq!(filter.sort().unwrap()[0].direction, SortDirection::Descending);
    }

    #[test]
    fn test_sort_rejects_bad_direction() {
        let filter = Filter::new().order_by("name sideways");
        assert_eq!(filter.sort().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_limit_offset_parsing() {
        let filter = Filter::from_json(json!({"_limit": "10", "_offset": 20})).unwrap();
        assert_eq!(filter.limit_value().unwrap(), Some(10));
        assert_eq!(filter.offset_value().unwrap(), Some(20));

        let filter = Filter::from_json(json!({"_limit": "ten"})).unwrap();
        assert_eq!(
            filter.limit_value().unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let filter = Filter::from_json(json!({"_offset": -1})).unwrap();
        assert!(filter.offset_value().is_err());

        let filter = Filter::new().limit(i64::MAX as u64 + 1);
        assert_eq!(
            filter.limit_value().unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_point_in_time_keys() {
        let filter = Filter::from_json(json!({"_datetime": "2020-01-01"})).unwrap();
        assert_eq!(
            filter.point_in_time().unwrap(),
            Some(Instant::parse("2020-01-01").unwrap())
        );

        let filter = Filter::from_json(json!({"#datetime": "now"})).unwrap();
        assert!(matches!(filter.point_in_time().unwrap(), Some(Instant::At(_))));

        assert_eq!(Filter::new().point_in_time().unwrap(), None);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Filter::from_json(json!(null)).unwrap().is_empty());
        assert!(Filter::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_describe() {
        let filter = Filter::new().eq("id", 3).limit(1);
        assert_eq!(filter.describe(), "{id=3}");
    }
}
