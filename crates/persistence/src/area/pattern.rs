//! Per-field pattern values and whole-row area patterns.

use std::fmt;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::schema::{AREA_FIELDS, CONSTITUENCY_COLUMN};
use crate::types::{Record, scalar_text};

/// Matches any concrete value.
pub const WILDCARD: &str = "*";

/// Prefix of an exception set (`~a,b`).
pub const EXCEPTION_PREFIX: char = '~';

/// The value of one area field in a pattern.
///
/// The syntax is interpreted on every field; in practice exception sets only
/// occur on `neighborhood`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternValue {
    /// Matches exactly this value.
    Literal(String),
    /// Matches any value.
    Wildcard,
    /// Matches any value not listed.
    Except(Vec<String>),
}

impl PatternValue {
    /// Parses stored pattern text.
    pub fn parse(text: &str) -> Self {
        if text == WILDCARD {
            PatternValue::Wildcard
        } else if let Some(rest) = text.strip_prefix(EXCEPTION_PREFIX) {
            PatternValue::Except(
                rest.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect(),
            )
        } else {
            PatternValue::Literal(text.to_string())
        }
    }

    /// Parses a JSON field value; null and absent mean wildcard.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => PatternValue::Wildcard,
            Some(v) => Self::parse(&scalar_text(v)),
        }
    }

    /// Does the pattern accept the concrete value `value`?
    ///
    /// `None` stands for a field the address does not specify; only a
    /// wildcard accepts it.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match (self, value) {
            (PatternValue::Wildcard, _) => true,
            (_, None) => false,
            (PatternValue::Literal(p), Some(v)) => p == v,
            (PatternValue::Except(excluded), Some(v)) => !excluded.iter().any(|e| e == v),
        }
    }

    /// Do the two patterns accept at least one common concrete value?
    pub fn intersects(&self, other: &PatternValue) -> bool {
        match (self, other) {
            (PatternValue::Wildcard, _) | (_, PatternValue::Wildcard) => true,
            (PatternValue::Literal(a), PatternValue::Literal(b)) => a == b,
            (PatternValue::Literal(v), PatternValue::Except(excluded))
            | (PatternValue::Except(excluded), PatternValue::Literal(v)) => {
                !excluded.contains(v)
            }
            // Finite exclusions of an unbounded domain always share values.
            (PatternValue::Except(_), PatternValue::Except(_)) => true,
        }
    }
}

impl fmt::Display for PatternValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternValue::Literal(v) => write!(f, "{}", v),
            PatternValue::Wildcard => write!(f, "{}", WILDCARD),
            PatternValue::Except(values) => write!(f, "{}{}", EXCEPTION_PREFIX, values.join(",")),
        }
    }
}

/// One stored area pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPattern {
    /// The owning constituency.
    pub constituency_id: Value,
    /// Field patterns in [`AREA_FIELDS`] order.
    pub fields: [PatternValue; 9],
}

impl AreaPattern {
    /// Reads a pattern out of an area row.
    pub fn from_record(record: &Record) -> StorageResult<Self> {
        let constituency_id = record
            .get(CONSTITUENCY_COLUMN)
            .cloned()
            .ok_or_else(|| StorageError::missing_argument(CONSTITUENCY_COLUMN))?;
        let fields = AREA_FIELDS.map(|f| PatternValue::from_json(record.get(f)));
        Ok(Self {
            constituency_id,
            fields,
        })
    }

    /// Does the pattern cover the concrete address?
    pub fn matches_address(&self, address: &Record) -> bool {
        AREA_FIELDS.iter().zip(&self.fields).all(|(name, pattern)| {
            let value = match address.get(*name) {
                None | Some(Value::Null) => None,
                Some(v) => Some(scalar_text(v)),
            };
            pattern.matches(value.as_deref())
        })
    }

    /// Is the pattern compatible with every constrained field of `query`?
    ///
    /// `query` pairs an index into [`AREA_FIELDS`] with a pattern value.
    pub fn matches_query(&self, query: &[(usize, PatternValue)]) -> bool {
        query
            .iter()
            .all(|(i, wanted)| self.fields[*i].intersects(wanted))
    }

    /// Could a single address be covered by both patterns?
    pub fn overlaps(&self, other: &AreaPattern) -> bool {
        self.fields
            .iter()
            .zip(&other.fields)
            .all(|(a, b)| a.intersects(b))
    }

    /// Renders the pattern back into a row.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(CONSTITUENCY_COLUMN.to_string(), self.constituency_id.clone());
        for (name, value) in AREA_FIELDS.iter().zip(&self.fields) {
            record.insert(name.to_string(), Value::String(value.to_string()));
        }
        record
    }
}

impl fmt::Display for AreaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|p| p.to_string()).collect();
        write!(f, "{} <- [{}]", scalar_text(&self.constituency_id), parts.join(" | "))
    }
}

/// Extracts the area-field constraints of a filter-like map.
pub fn query_fields<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Vec<(usize, PatternValue)> {
    entries
        .filter_map(|(k, v)| {
            AREA_FIELDS
                .iter()
                .position(|f| f == k)
                .map(|i| (i, PatternValue::from_json(Some(v))))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn prague_address(neighborhood: &str) -> Record {
        record(json!({
            "country": "CZ",
            "administrative_area_level_1": "Hlavní město Praha",
            "administrative_area_level_2": "Hlavní město Praha",
            "administrative_area_level_3": "Praha",
            "locality": "Praha",
            "sublocality": "Praha 4",
            "neighborhood": neighborhood,
            "route": "Novodvorská",
            "street_number": "12"
        }))
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(PatternValue::parse("*"), PatternValue::Wildcard);
        assert_eq!(
            PatternValue::parse("~Hodkovičky, Lhotka"),
            PatternValue::Except(vec!["Hodkovičky".into(), "Lhotka".into()])
        );
        assert_eq!(PatternValue::parse("Braník"), PatternValue::Literal("Braník".into()));
        assert_eq!(PatternValue::parse("~Hodkovičky,Lhotka").to_string(), "~Hodkovičky,Lhotka");
    }

    #[test]
    fn test_field_matching() {
        let except = PatternValue::parse("~Hodkovičky,Lhotka");
        assert!(except.matches(Some("Braník")));
        assert!(!except.matches(Some("Hodkovičky")));
        assert!(!except.matches(None));
        assert!(PatternValue::Wildcard.matches(None));
        assert!(PatternValue::parse("Praha").matches(Some("Praha")));
        assert!(!PatternValue::parse("Praha").matches(Some("Brno")));
    }

    #[test]
    fn test_exception_set_pattern_against_addresses() {
        let pattern = AreaPattern::from_record(&record(json!({
            "constituency_id": 21,
            "country": "*",
            "administrative_area_level_1": "*",
            "administrative_area_level_2": "*",
            "administrative_area_level_3": "*",
            "locality": "*",
            "sublocality": "*",
            "neighborhood": "~Hodkovičky,Lhotka",
            "route": "*",
            "street_number": "*"
        })))
        .unwrap();

        assert!(pattern.matches_address(&prague_address("Braník")));
        assert!(!pattern.matches_address(&prague_address("Hodkovičky")));
        let constrained = pattern
            .fields
            .iter()
            .filter(|f| **f != PatternValue::Wildcard)
            .count();
        assert_eq!(constrained, 1);
    }

    #[test]
    fn test_missing_fields_default_to_wildcard() {
        let pattern =
            AreaPattern::from_record(&record(json!({"constituency_id": 1, "country": "CZ"})))
                .unwrap();
        assert!(pattern.matches_address(&prague_address("Braník")));
        assert_eq!(pattern.fields[1], PatternValue::Wildcard);
        assert!(AreaPattern::from_record(&record(json!({"country": "CZ"}))).is_err());
    }

    #[test]
    fn test_intersections() {
        let lit = PatternValue::parse("Lhotka");
        let other = PatternValue::parse("Braník");
        let except = PatternValue::parse("~Lhotka");
        assert!(!lit.intersects(&other));
        assert!(!lit.intersects(&except));
        assert!(other.intersects(&except));
        assert!(except.intersects(&PatternValue::parse("~Braník")));
        assert!(PatternValue::Wildcard.intersects(&lit));
    }

    #[test]
    fn test_overlap_between_exception_and_literal_patterns() {
        let general = AreaPattern::from_record(&record(json!({
            "constituency_id": 1, "locality": "Praha", "neighborhood": "~Hodkovičky,Lhotka"
        })))
        .unwrap();
        let specific = AreaPattern::from_record(&record(json!({
            "constituency_id": 2, "locality": "Praha", "neighborhood": "Lhotka"
        })))
        .unwrap();
        let clash = AreaPattern::from_record(&record(json!({
            "constituency_id": 2, "locality": "Praha", "neighborhood": "Braník"
        })))
        .unwrap();
        assert!(!general.overlaps(&specific));
        assert!(general.overlaps(&clash));
    }

    #[test]
    fn test_query_fields() {
        let filter = record(json!({"neighborhood": "Braník", "constituency_id": 4, "_limit": 1}));
        let query = query_fields(filter.iter());
        assert_eq!(query, vec![(6, PatternValue::Literal("Braník".into()))]);
    }

    #[test]
    fn test_to_record_roundtrip() {
        let pattern = AreaPattern::from_record(&record(json!({
            "constituency_id": 3, "neighborhood": "~A,B"
        })))
        .unwrap();
        let back = AreaPattern::from_record(&pattern.to_record()).unwrap();
        assert_eq!(back, pattern);
        assert_eq!(pattern.to_record()["route"], "*");
    }
}
