//! Backend abstraction for database drivers.
//!
//! A [`Backend`] owns the connection pool and knows how to create the tables
//! described by a [`Catalog`]. The stores are built on top of one backend and
//! share it.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::schema::Catalog;

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A database driver.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Returns the backend kind.
    fn kind(&self) -> BackendKind;

    /// Returns a short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Checks that the database answers queries.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Creates every table of `catalog` that does not exist yet.
    ///
    /// Must be idempotent.
    async fn initialize(&self, catalog: &Catalog) -> Result<(), BackendError>;
}
