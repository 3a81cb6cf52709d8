//! SQLite backend implementation.
//!
//! Supports in-memory databases (great for testing) and file-based
//! databases. Every table described in a [`Catalog`](crate::schema::Catalog)
//! gets a store:
//!
//! - [`EntityStore`] - fixed-schema tables
//! - [`AttributeStore`] - versioned attribute tables
//! - [`AreaStore`] - area patterns and address resolution
//!
//! and [`ProjectionBuilder`] composes them into joined reads.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parldata_persistence::backends::sqlite::{EntityStore, SqliteBackend};
//! use parldata_persistence::core::TableStorage;
//! use parldata_persistence::schema::{Catalog, EntitySchema};
//! use parldata_persistence::types::Filter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//!
//! let parliament = EntitySchema::builder("parliament")
//!     .columns(["code", "name"])
//!     .primary_key(["code"])
//!     .build()?;
//! let mut catalog = Catalog::new();
//! catalog.add_entity(&parliament)?;
//! backend.init_schema(&catalog)?;
//!
//! let parliaments = EntityStore::new(backend, Arc::new(parliament));
//! let rows = parliaments.read(&Filter::new().eq("code", "cz-psp")).await?;
//! # Ok(())
//! # }
//! ```

mod area;
mod attribute;
mod backend;
mod entity;
mod projection;
mod rows;
mod schema;

pub use area::AreaStore;
pub use attribute::AttributeStore;
pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use entity::EntityStore;
pub use projection::{EntityDescriptor, JoinCondition, Projection, ProjectionBuilder};
pub use schema::SCHEMA_VERSION;
