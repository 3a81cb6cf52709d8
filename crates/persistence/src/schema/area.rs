//! Area pattern table description.

use crate::area::WILDCARD;
use crate::error::StorageResult;

use super::entity::EntitySchema;

/// Column naming the owning constituency.
pub const CONSTITUENCY_COLUMN: &str = "constituency_id";

/// Address fields, from the coarsest to the finest.
pub const AREA_FIELDS: [&str; 9] = [
    "country",
    "administrative_area_level_1",
    "administrative_area_level_2",
    "administrative_area_level_3",
    "locality",
    "sublocality",
    "neighborhood",
    "route",
    "street_number",
];

/// Immutable description of the area pattern table.
///
/// The key spans the constituency column and every address field, so the
/// same pattern may be stored once per constituency.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaSchema {
    entity: EntitySchema,
}

impl AreaSchema {
    /// Describes an area table named `table`.
    pub fn new(table: impl Into<String>) -> StorageResult<Self> {
        Self::build(table.into(), None)
    }

    /// Describes an area table whose constituency column references
    /// `constituency`'s single-column primary key.
    pub fn referencing(table: impl Into<String>, constituency: &EntitySchema) -> StorageResult<Self> {
        Self::build(table.into(), Some(constituency))
    }

    fn build(table: String, constituency: Option<&EntitySchema>) -> StorageResult<Self> {
        let mut builder = EntitySchema::builder(table)
            .column(CONSTITUENCY_COLUMN)
            .columns(AREA_FIELDS)
            .primary_key(std::iter::once(CONSTITUENCY_COLUMN).chain(AREA_FIELDS));
        for field in AREA_FIELDS {
            builder = builder.default_value(field, WILDCARD);
        }
        if let Some(constituency) = constituency {
            builder = builder.references(
                [CONSTITUENCY_COLUMN.to_string()],
                constituency.table(),
                constituency.primary_key().iter().cloned(),
            );
        }
        Ok(Self {
            entity: builder.build()?,
        })
    }

    /// Table name.
    pub fn table(&self) -> &str {
        self.entity.table()
    }

    /// The equivalent fixed-schema description.
    pub fn entity_schema(&self) -> &EntitySchema {
        &self.entity
    }

    /// Returns true if `column` is one of the nine address fields.
    pub fn is_area_field(column: &str) -> bool {
        AREA_FIELDS.contains(&column)
    }
}
