//! Core value types: records, filters and validity instants.

mod filter;
mod instant;
mod record;

pub use filter::{
    DATETIME_KEYS, Filter, LIMIT_KEY, OFFSET_KEY, ORDER_KEY, SortDirection, SortDirective,
};
pub use instant::{Instant, NEG_INFINITY, NOW, POS_INFINITY};
pub use record::{PrimaryKey, Record, ensure_scalar, project, records_from_json, scalar_text};
