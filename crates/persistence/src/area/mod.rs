//! Hierarchical area matching.
//!
//! An area pattern assigns addresses to a constituency. Each address field of
//! a pattern is a literal, the wildcard `*`, or an exception set `~a,b,…`.
//! A pattern covers an address when every field matches; matching is
//! independent of storage and lives here, while the backend's area store
//! handles persistence and prefiltering.

mod pattern;

pub use pattern::{AreaPattern, EXCEPTION_PREFIX, PatternValue, WILDCARD, query_fields};

/// Two patterns of different constituencies that can cover the same address.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOverlap {
    /// The pattern stored first.
    pub first: AreaPattern,
    /// The pattern stored later.
    pub second: AreaPattern,
}

/// Lists every pair of patterns that belong to different constituencies and
/// overlap.
pub fn find_overlaps(patterns: &[AreaPattern]) -> Vec<AreaOverlap> {
    let mut overlaps = Vec::new();
    for (i, first) in patterns.iter().enumerate() {
        for second in &patterns[i + 1..] {
            if first.constituency_id != second.constituency_id && first.overlaps(second) {
                overlaps.push(AreaOverlap {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pattern(value: serde_json::Value) -> AreaPattern {
        AreaPattern::from_record(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_find_overlaps_skips_same_constituency() {
        let patterns = vec![
            pattern(json!({"constituency_id": 1, "locality": "Praha"})),
            pattern(json!({"constituency_id": 1, "locality": "Praha", "neighborhood": "Braník"})),
            pattern(json!({"constituency_id": 2, "locality": "Brno"})),
            pattern(json!({"constituency_id": 3, "neighborhood": "Braník"})),
        ];
        let overlaps = find_overlaps(&patterns);
        assert_eq!(overlaps.len(), 3);
        assert!(overlaps.iter().all(|o| o.second.constituency_id == json!(3)));
    }
}
