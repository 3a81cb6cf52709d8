//! Consistency checks over the stored data.
//!
//! The stores do not enforce two modelling invariants: versions of one
//! attribute must not overlap in time, and patterns of different
//! constituencies must not cover the same address. The checks here find
//! violations so they can be fixed by hand.

use parldata_persistence::schema::DEFAULT_PARL;
use parldata_persistence::types::scalar_text;
use parldata_persistence::{Filter, Record, TableStorage};
use serde::Serialize;
use tracing::warn;

use crate::error::UpdaterResult;
use crate::tables::Stores;

/// Two versions of the same attribute whose intervals intersect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeOverlap {
    pub table: String,
    /// Parent key, name, lang and parl shared by both versions.
    pub attribute: Record,
    pub first_since: String,
    pub first_until: String,
    pub second_since: String,
}

/// Outcome of checking one parliament.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub parliament: String,
    /// Overlapping area pattern pairs, rendered for humans.
    pub area_overlaps: Vec<String>,
    pub attribute_overlaps: Vec<AttributeOverlap>,
}

impl CheckReport {
    /// Returns true if nothing was found.
    pub fn is_clean(&self) -> bool {
        self.area_overlaps.is_empty() && self.attribute_overlaps.is_empty()
    }
}

/// Runs every check.
///
/// Attribute versions are checked when they belong to `parliament` or to no
/// parliament at all. Area patterns are checked as a whole.
pub async fn check_stores(parliament: &str, stores: &Stores) -> UpdaterResult<CheckReport> {
    let mut report = CheckReport {
        parliament: parliament.to_string(),
        ..Default::default()
    };

    report.area_overlaps = stores
        .area()
        .overlaps()
        .await?
        .iter()
        .map(|o| format!("{} / {}", o.first, o.second))
        .collect();

    for (table, store) in stores.attributes() {
        let mut identity: Vec<String> = store.schema().parent_key().to_vec();
        identity.extend(["name", "lang", "parl"].map(String::from));

        let mut filter = Filter::new();
        for column in identity.iter().map(String::as_str).chain(["since"]) {
            filter = filter.order_by(column);
        }
        let rows: Vec<Record> = store
            .read(&filter)
            .await?
            .into_iter()
            .filter(|row| {
                let parl = row.get("parl").map(scalar_text).unwrap_or_default();
                parl == parliament || parl == DEFAULT_PARL
            })
            .collect();

        // Rows are sorted by identity, then `since`; each version is compared
        // with the later versions of its group that start before it ends.
        for (i, first) in rows.iter().enumerate() {
            let first_since = first.get("since").map(scalar_text).unwrap_or_default();
            let first_until = first.get("until").map(scalar_text).unwrap_or_default();
            for second in &rows[i + 1..] {
                if identity.iter().any(|c| first.get(c) != second.get(c)) {
                    break;
                }
                let second_since = second.get("since").map(scalar_text).unwrap_or_default();
                // Canonical instant text sorts in time order.
                if second_since >= first_until {
                    break;
                }
                let overlap = AttributeOverlap {
                    table: table.clone(),
                    attribute: identity
                        .iter()
                        .filter_map(|c| first.get(c).map(|v| (c.clone(), v.clone())))
                        .collect(),
                    first_since: first_since.clone(),
                    first_until: first_until.clone(),
                    second_since,
                };
                warn!(table = %table, attribute = ?overlap.attribute, "Overlapping attribute versions");
                report.attribute_overlaps.push(overlap);
            }
        }
    }

    Ok(report)
}
