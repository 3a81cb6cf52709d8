//! Schema descriptions.
//!
//! Every table the stores touch is described by an immutable value built at
//! startup: [`EntitySchema`] for fixed-schema tables, [`AttributeSchema`] for
//! versioned attribute side-tables and [`AreaSchema`] for the area pattern
//! table. A [`Catalog`] collects them so the backend can create the tables.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{StorageError, StorageResult};

mod area;
mod attribute;
mod catalog;
mod entity;

pub use area::{AREA_FIELDS, AreaSchema, CONSTITUENCY_COLUMN};
pub use attribute::{ATTRIBUTE_COLUMNS, AttributeSchema, DEFAULT_LANG, DEFAULT_PARL};
pub use catalog::Catalog;
pub use entity::{EntitySchema, EntitySchemaBuilder, ForeignKey, Generator, ReadOnlyColumn};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// Checks that `name` is usable as a table or column name.
pub fn validate_identifier(name: &str) -> StorageResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(StorageError::invalid_argument(
            name,
            "identifiers must match [A-Za-z_][A-Za-z0-9_]*",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("mp").is_ok());
        assert!(validate_identifier("administrative_area_level_1").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("1st").is_err());
        assert!(validate_identifier("name\"; --").is_err());
        assert!(validate_identifier("").is_err());
    }
}
