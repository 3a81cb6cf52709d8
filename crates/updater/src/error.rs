//! Updater errors.

use std::path::PathBuf;

use parldata_persistence::StorageError;
use thiserror::Error;

/// Errors raised while dispatching or applying a parliament update.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// No handler is registered under the code.
    #[error("unknown parliament '{0}'")]
    UnknownParliament(String),

    /// Two handlers claim the same code.
    #[error("parliament '{0}' is registered twice")]
    DuplicateParliament(String),

    /// A dataset names a table the catalog does not know.
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// A dataset file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dataset file is not a valid dataset.
    #[error("malformed dataset {path}: {source}")]
    Dataset {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The stores rejected an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for updater operations.
pub type UpdaterResult<T> = Result<T, UpdaterError>;
