//! Points on the validity time line.
//!
//! Versioned attributes are valid over a half-open interval `[since, until)`
//! whose bounds may be unbounded. [`Instant`] models such a bound and owns its
//! canonical text form, which is what ends up in the `since`/`until` columns.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{StorageError, StorageResult};

/// Stored text for the unbounded past.
pub const NEG_INFINITY: &str = "-infinity";

/// Stored text for the unbounded future.
pub const POS_INFINITY: &str = "infinity";

/// Input literal that selects the current time.
pub const NOW: &str = "now";

/// A bound of a validity interval.
///
/// The canonical text forms (`-infinity`, `YYYY-MM-DDTHH:MM:SSZ`, `infinity`)
/// sort lexicographically in the same order as the instants they denote,
/// so interval predicates can run as plain text comparisons in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instant {
    /// Before every other instant.
    NegInfinity,
    /// A concrete moment, truncated to whole seconds.
    At(DateTime<Utc>),
    /// After every other instant.
    PosInfinity,
}

impl Instant {
    /// The current time, truncated to whole seconds.
    pub fn now() -> Self {
        Instant::at(Utc::now())
    }

    /// Wraps a concrete moment.
    pub fn at(moment: DateTime<Utc>) -> Self {
        // Stored text has second precision; keep equality consistent with it.
        let secs = moment.timestamp();
        Instant::At(DateTime::from_timestamp(secs, 0).unwrap_or(moment))
    }

    /// Returns the canonical stored text.
    pub fn to_sql_text(&self) -> String {
        match self {
            Instant::NegInfinity => NEG_INFINITY.to_string(),
            Instant::At(moment) => moment.to_rfc3339_opts(SecondsFormat::Secs, true),
            Instant::PosInfinity => POS_INFINITY.to_string(),
        }
    }

    /// Parses any accepted input form.
    ///
    /// Accepts the two sentinels, `now`, RFC 3339, `YYYY-MM-DD HH:MM:SS`
    /// and `YYYY-MM-DD` (midnight UTC).
    pub fn parse(input: &str) -> StorageResult<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            NEG_INFINITY => return Ok(Instant::NegInfinity),
            POS_INFINITY | "+infinity" => return Ok(Instant::PosInfinity),
            NOW => return Ok(Instant::now()),
            _ => {}
        }

        if let Ok(moment) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Instant::at(moment.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
            return Ok(Instant::at(naive.and_utc()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Instant::at(naive.and_utc()));
            }
        }

        Err(StorageError::invalid_argument(
            "instant",
            format!("cannot parse '{}' as a point in time", input),
        ))
    }

    /// Parses a JSON value holding an instant (strings only).
    pub fn from_json(value: &serde_json::Value) -> StorageResult<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            other => Err(StorageError::invalid_argument(
                "instant",
                format!("expected a timestamp string, got {}", other),
            )),
        }
    }

    /// Returns true if `self` lies inside `[since, until)`.
    pub fn within(&self, since: &Instant, until: &Instant) -> bool {
        since <= self && self < until
    }

    fn rank(&self) -> u8 {
        match self {
            Instant::NegInfinity => 0,
            Instant::At(_) => 1,
            Instant::PosInfinity => 2,
        }
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Instant::At(a), Instant::At(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql_text())
    }
}

impl FromStr for Instant {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DateTime<Utc>> for Instant {
    fn from(moment: DateTime<Utc>) -> Self {
        Instant::at(moment)
    }
}

impl Serialize for Instant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_sql_text())
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Instant::parse(&text).map_err(serde::de::Error::custom)
    }
}
