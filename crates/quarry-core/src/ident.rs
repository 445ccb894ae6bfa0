//! Stable identifiers for datasets and authors.
//!
//! Three identifiers anchor everything else:
//!
//! - [`InitId`]: the Blake3 hash of a dataset log's root init op. Minted
//!   once, survives renames, key rotations, and replication.
//! - [`AuthorId`]: the SHA-256 digest of an author's origin public key,
//!   carried in every op header.
//! - [`ProfileId`]: the base58 rendering of the SHA-256 multihash of the
//!   origin public key. 46 characters, pinned to the origin key even
//!   after rotation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{Hash, PublicKey};
use crate::error::IdentError;

/// The length of every valid profileID string.
pub const PROFILE_ID_LENGTH: usize = 46;

/// Multihash prefix for a SHA-256 digest: code 0x12, length 0x20.
const MULTIHASH_SHA256: [u8; 2] = [0x12, 0x20];

/// Stable dataset identifier: the hash of the dataset log's root init op.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InitId(pub [u8; 32]);

impl InitId {
    /// Create from the hash of a root init op.
    pub const fn from_hash(hash: Hash) -> Self {
        Self(hash.0)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to the hex string carried in [`crate::Ref`] fields.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for InitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InitId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for InitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for InitId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| IdentError::InvalidInitId(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentError::InvalidInitId(format!("wrong length for {s:?}")))?;
        Ok(Self(arr))
    }
}

/// The 32-byte author digest carried in op headers.
///
/// `AuthorId` is the SHA-256 digest of the author's origin public key; it
/// is the binary half of a [`ProfileId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorId(pub [u8; 32]);

impl AuthorId {
    /// Derive from a public key.
    pub fn from_pub_key(key: &PublicKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self(digest.into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The profileID string for this author.
    pub fn profile_id(&self) -> ProfileId {
        let mut multihash = Vec::with_capacity(34);
        multihash.extend_from_slice(&MULTIHASH_SHA256);
        multihash.extend_from_slice(&self.0);
        ProfileId(bs58::encode(multihash).into_string())
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorId({})", &hex::encode(self.0)[..16])
    }
}

impl AsRef<[u8]> for AuthorId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The public author identifier: base58 of the SHA-256 multihash of the
/// origin public key. Always [`PROFILE_ID_LENGTH`] characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Derive from an author's origin public key.
    pub fn from_pub_key(key: &PublicKey) -> Self {
        AuthorId::from_pub_key(key).profile_id()
    }

    /// Parse and validate an existing profileID string.
    pub fn parse(s: &str) -> Result<Self, IdentError> {
        if s.len() != PROFILE_ID_LENGTH {
            return Err(IdentError::InvalidProfileId);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| IdentError::InvalidProfileId)?;
        if bytes.len() != 34 || bytes[..2] != MULTIHASH_SHA256 {
            return Err(IdentError::InvalidProfileId);
        }
        Ok(Self(s.to_string()))
    }

    /// Recover the binary [`AuthorId`] half.
    pub fn author_id(&self) -> AuthorId {
        // parse() guaranteed the multihash shape
        let bytes = bs58::decode(&self.0).into_vec().unwrap_or_default();
        let mut arr = [0u8; 32];
        if bytes.len() == 34 {
            arr.copy_from_slice(&bytes[2..]);
        }
        AuthorId(arr)
    }

    /// The string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
