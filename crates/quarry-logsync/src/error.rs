//! Error types for log transfer.

use thiserror::Error;

use quarry_logbook::LogbookError;
use quarry_oplog::OplogError;

/// Errors that can occur while syncing logs between nodes.
#[derive(Debug, Error)]
pub enum LogsyncError {
    /// Missing or malformed `AuthorID` / `PubKey` headers.
    #[error("bad author headers: {0}")]
    BadHeaders(String),

    /// The named dataset is unknown here.
    #[error("reference not found")]
    RefNotFound,

    /// The sender is not the author this operation requires.
    #[error("unauthorized")]
    Unauthorized,

    /// The logbook rejected the operation.
    #[error(transparent)]
    Logbook(#[from] LogbookError),

    /// The fragment failed to decode or verify.
    #[error(transparent)]
    Oplog(#[from] OplogError),

    /// The transport failed before an HTTP status was available.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-OK status.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },
}

impl LogsyncError {
    /// The HTTP status a host answers for this error: unknown refs are
    /// 404, everything else the sender caused is 400.
    pub fn status_code(&self) -> u16 {
        match self {
            LogsyncError::RefNotFound => 404,
            LogsyncError::Logbook(LogbookError::RefNotFound) => 404,
            _ => 400,
        }
    }
}

/// Result type for logsync operations.
pub type Result<T> = std::result::Result<T, LogsyncError>;
