//! Error types for the dscache.

use thiserror::Error;

use quarry_core::canonical::CanonicalError;
use quarry_core::resolve::ResolveError;

/// Errors that can occur during dscache operations.
#[derive(Debug, Error)]
pub enum DscacheError {
    /// Methods were called on a cache that holds no data.
    #[error("dscache: does not exist")]
    NoDscache,

    /// A profileID that is not a 46-character base58 fingerprint.
    #[error("invalid profileID")]
    InvalidProfileId,

    /// No entry matches the reference.
    #[error("reference not found")]
    RefNotFound,

    /// The cache table failed to encode or decode.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// A cache file this build does not speak.
    #[error("unsupported dscache format version: {0}")]
    UnsupportedVersion(u16),

    /// The file on disk is not a dscache.
    #[error("corrupt dscache: {0}")]
    Corrupt(String),

    /// Persistence failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DscacheError> for ResolveError {
    fn from(e: DscacheError) -> Self {
        match e {
            DscacheError::NoDscache | DscacheError::RefNotFound => ResolveError::NotFound,
            other => ResolveError::Other(other.to_string()),
        }
    }
}

/// Result type for dscache operations.
pub type Result<T> = std::result::Result<T, DscacheError>;
