//! Error types shared across the core primitives.

use thiserror::Error;

/// Errors from signature and key handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Errors from identifier parsing and validation.
#[derive(Debug, Error)]
pub enum IdentError {
    #[error("invalid profileID")]
    InvalidProfileId,

    #[error("invalid initID: {0}")]
    InvalidInitId(String),

    #[error("invalid ref string: {0}")]
    InvalidRefString(String),
}
