//! Core storage traits and abstractions.
//!
//! - [`Backend`] - Database driver abstraction
//! - [`TableStorage`] - CRUD over the rows of one table
//! - [`TemporalStorage`] - Versioned attribute operations
//!
//! ```text
//! TableStorage
//!     └── TemporalStorage
//! ```

pub mod backend;
pub mod storage;

pub use backend::{Backend, BackendKind};
pub use storage::{AttributeValue, TableStorage, TemporalStorage};
