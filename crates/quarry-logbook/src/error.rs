//! Error types for the logbook.

use thiserror::Error;

use quarry_core::resolve::ResolveError;
use quarry_oplog::OplogError;

/// Errors that can occur during logbook operations.
#[derive(Debug, Error)]
pub enum LogbookError {
    /// No live dataset matches the reference.
    #[error("reference not found")]
    RefNotFound,

    /// The dataset's log ends in a tombstone; further writes are
    /// rejected.
    #[error("dataset is deleted")]
    Deleted,

    /// The caller is not the author this operation requires.
    #[error("unauthorized")]
    Unauthorized,

    /// A name that cannot root a log.
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// Another live dataset already holds `username/name`.
    #[error("dataset {0:?} already exists for this author")]
    NameTaken(String),

    /// Bad pagination parameters; the message carries the exact bound
    /// that was violated.
    #[error("{0}")]
    List(String),

    /// Chain-level failure: bad linkage, corrupt bytes, foreign author.
    #[error(transparent)]
    Oplog(#[from] OplogError),

    /// Persistence failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogbookError> for ResolveError {
    fn from(e: LogbookError) -> Self {
        match e {
            LogbookError::RefNotFound | LogbookError::Deleted => ResolveError::NotFound,
            LogbookError::InvalidName(name) => ResolveError::InvalidRef(name),
            other => ResolveError::Other(other.to_string()),
        }
    }
}

/// Result type for logbook operations.
pub type Result<T> = std::result::Result<T, LogbookError>;
