//! Parliament Data Persistence Layer
//!
//! A temporal attribute/entity data-access layer for parliamentary data:
//! MPs, parliaments, groups, constituencies and the like live in
//! fixed-schema tables, their changing properties (names, party, e-mail,
//! translations) in versioned attribute side-tables, and a table of
//! hierarchical area patterns maps postal addresses onto constituencies.
//!
//! # Architecture
//!
//! - [`types`] - Records, filter maps and validity instants
//! - [`query`] - The filter compiler and SQL fragments
//! - [`schema`] - Immutable table descriptions built at startup
//! - [`area`] - Area pattern matching
//! - [`core`] - Storage traits
//! - [`backends`] - Backend implementations (SQLite)
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parldata_persistence::backends::sqlite::{AttributeStore, EntityStore, SqliteBackend};
//! use parldata_persistence::core::{AttributeValue, TableStorage, TemporalStorage};
//! use parldata_persistence::schema::{AttributeSchema, Catalog, EntitySchema};
//! use parldata_persistence::types::{Filter, Instant, records_from_json};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mp = EntitySchema::builder("mp")
//!     .columns(["id", "first_name", "last_name"])
//!     .primary_key(["id"])
//!     .serial("id")
//!     .build()?;
//! let mp_attributes = AttributeSchema::for_entity(&mp, "mp_attribute")?;
//!
//! let mut catalog = Catalog::new();
//! catalog.add_entity(&mp)?;
//! catalog.add_attribute(&mp_attributes)?;
//!
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema(&catalog)?;
//!
//! let mps = EntityStore::new(backend.clone(), Arc::new(mp));
//! let attributes = AttributeStore::new(backend, Arc::new(mp_attributes));
//!
//! let keys = mps
//!     .create(records_from_json(json!({"first_name": "Jana", "last_name": "Nová"}))?)
//!     .await?;
//! let parent = json!({"mp_id": keys[0]["id"]}).as_object().cloned().unwrap_or_default();
//! attributes
//!     .supersede(AttributeValue::new(parent, "email", "nova@psp.cz"), Instant::now())
//!     .await?;
//!
//! let current = attributes.read(&Filter::new().eq("name", "email").now()).await?;
//! assert_eq!(current.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod area;
pub mod backends;
pub mod core;
pub mod error;
pub mod query;
pub mod schema;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorKind, StorageError, StorageResult};
pub use types::{Filter, Instant, PrimaryKey, Record};

// Re-export core traits
pub use core::{AttributeValue, Backend, BackendKind, TableStorage, TemporalStorage};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
