//! Error types for the persistence layer.
//!
//! Errors are grouped by where they originate: caller input
//! ([`ValidationError`]), row lookups ([`ResourceError`]), multi-row writes
//! ([`TransactionError`]) and the database itself ([`BackendError`]).
//! [`StorageError::kind`] collapses all of them onto the flat taxonomy the
//! orchestration layer dispatches on.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Caller input errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Row lookup errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors caused by malformed or forbidden caller input.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A filter value or data value has the wrong shape.
    #[error("invalid argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    /// A required argument was not supplied.
    #[error("missing argument: {argument}")]
    MissingArgument { argument: String },

    /// The caller tried to write a column only the store may set.
    #[error("column '{column}' of table '{table}' is read-only")]
    ReadOnlyViolation { table: String, column: String },
}

/// Errors related to row lookups.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A lookup expecting exactly one row found none.
    #[error("no row in '{table}' matches {filter}")]
    NotFound { table: String, filter: String },

    /// A lookup expecting one answer found several distinct ones.
    #[error("ambiguous match in '{table}': {candidates:?}")]
    Ambiguous {
        table: String,
        candidates: Vec<String>,
    },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Flat classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed filter or data value.
    InvalidArgument,
    /// Required argument absent.
    MissingArgument,
    /// Write to a read-only column.
    ReadOnlyViolation,
    /// Expected row not found.
    NotFound,
    /// Several distinct answers where one was expected.
    Ambiguous,
    /// The underlying store rejected the operation.
    StorageFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::MissingArgument => "missing-argument",
            ErrorKind::ReadOnlyViolation => "read-only-violation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::StorageFailure => "storage-failure",
        };
        write!(f, "{}", name)
    }
}

impl StorageError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(ValidationError::InvalidArgument { .. }) => {
                ErrorKind::InvalidArgument
            }
            StorageError::Validation(ValidationError::MissingArgument { .. }) => {
                ErrorKind::MissingArgument
            }
            StorageError::Validation(ValidationError::ReadOnlyViolation { .. }) => {
                ErrorKind::ReadOnlyViolation
            }
            StorageError::Resource(ResourceError::NotFound { .. }) => ErrorKind::NotFound,
            StorageError::Resource(ResourceError::Ambiguous { .. }) => ErrorKind::Ambiguous,
            StorageError::Transaction(_) | StorageError::Backend(_) => ErrorKind::StorageFailure,
        }
    }

    /// Shorthand for an [`ValidationError::InvalidArgument`].
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Validation(ValidationError::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a [`ValidationError::MissingArgument`].
    pub fn missing_argument(argument: impl Into<String>) -> Self {
        StorageError::Validation(ValidationError::MissingArgument {
            argument: argument.into(),
        })
    }

    /// Shorthand for a [`ValidationError::ReadOnlyViolation`].
    pub fn read_only(table: impl Into<String>, column: impl Into<String>) -> Self {
        StorageError::Validation(ValidationError::ReadOnlyViolation {
            table: table.into(),
            column: column.into(),
        })
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = StorageError::invalid_argument("_limit", "expected a non-negative integer");
        assert_eq!(
            err.to_string(),
            "invalid argument '_limit': expected a non-negative integer"
        );

        let err = StorageError::read_only("mp", "id");
        assert_eq!(err.to_string(), "column 'id' of table 'mp' is read-only");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StorageError::missing_argument("entities").kind(),
            ErrorKind::MissingArgument
        );
        assert_eq!(
            StorageError::read_only("mp", "id").kind(),
            ErrorKind::ReadOnlyViolation
        );

        let err: StorageError = ResourceError::NotFound {
            table: "mp".to_string(),
            filter: "{}".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: StorageError = TransactionError::RolledBack {
            reason: "constraint".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::StorageFailure.to_string(), "storage-failure");
        assert_eq!(ErrorKind::NotFound.to_string(), "not-found");
    }

    #[test]
    fn test_ambiguous_display() {
        let err = ResourceError::Ambiguous {
            table: "area".to_string(),
            candidates: vec!["1".to_string(), "2".to_string()],
        };
        assert!(err.to_string().contains("ambiguous match in 'area'"));
    }
}
