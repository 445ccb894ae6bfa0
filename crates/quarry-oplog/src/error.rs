//! Error types for op chains.

use thiserror::Error;

use quarry_core::canonical::CanonicalError;

/// Errors that can occur while building, verifying, or merging op chains.
#[derive(Debug, Error)]
pub enum OplogError {
    /// An append's prev hash does not match the chain head.
    #[error("bad chain: {0}")]
    BadChain(String),

    /// Recomputed hashes or signatures do not match the recorded ones.
    #[error("corrupt log: {0}")]
    Corrupt(String),

    /// The caller is not the log's author.
    #[error("unauthorized")]
    Unauthorized,

    /// Bytes that do not parse as an op or log.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A file or fragment with a version this build does not speak.
    #[error("unsupported log format version: {0}")]
    UnsupportedVersion(u16),

    /// Payload encoding failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Result type for oplog operations.
pub type Result<T> = std::result::Result<T, OplogError>;
