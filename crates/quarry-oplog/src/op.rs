//! Op: the atomic unit of dataset history.
//!
//! An op is an immutable, signed event. Once created it cannot be
//! edited; changes are represented as new ops.

use serde::{Deserialize, Serialize};

use quarry_core::crypto::{Hash, Keypair, PublicKey, Signature};
use quarry_core::ident::AuthorId;

use crate::encode::{encode_op, signed_message_bytes};

/// Domain-separation prefix for key-rotation certificates.
pub const KEY_ROTATION_CONTEXT: &[u8] = b"quarry-key-rotation:";

/// The kind of op, determining how the payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpKind {
    /// Roots a log (author, dataset, or branch level).
    Init = 0x01,
    /// A new dataset version.
    Commit = 0x02,
    /// Changes the dataset's pretty name.
    Rename = 0x03,
    /// Tombstone: terminates the log while preserving history.
    Delete = 0x04,
    /// Marks the dataset published.
    Publish = 0x05,
    /// Retracts a publish.
    Unpublish = 0x06,
    /// Records a working-directory link.
    Link = 0x07,
    /// Clears a working-directory link.
    Unlink = 0x08,
    /// Rotates the author's signing key.
    KeyRotation = 0x09,
    /// Access-control grants (reserved; no local writer mints these).
    Acl = 0x0a,
}

impl OpKind {
    /// Convert to the wire type byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from the wire type byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Init),
            0x02 => Some(Self::Commit),
            0x03 => Some(Self::Rename),
            0x04 => Some(Self::Delete),
            0x05 => Some(Self::Publish),
            0x06 => Some(Self::Unpublish),
            0x07 => Some(Self::Link),
            0x08 => Some(Self::Unlink),
            0x09 => Some(Self::KeyRotation),
            0x0a => Some(Self::Acl),
            _ => None,
        }
    }
}

/// Which level of the log tree an Init op roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitScope {
    /// Roots an author's top-level log; `name` is the username.
    Author,
    /// Roots a dataset log; `name` is the pretty name.
    Dataset,
    /// Roots a branch log; `name` is the branch name.
    Branch,
}

/// Payload of an [`OpKind::Init`] op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    pub scope: InitScope,
    /// Username, pretty name, or branch name depending on scope.
    pub name: String,
    /// Writer-supplied entropy so re-creating a deleted name mints a
    /// fresh identity.
    pub nonce: u64,
    /// The author's origin public key. Present on author-scope roots,
    /// making the log tree self-certifying: the key must hash to the
    /// op's author digest.
    pub origin_key: Option<PublicKey>,
}

/// Payload of an [`OpKind::Commit`] op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    /// Content hash of the committed version.
    pub path: String,
    /// Title from the version's metadata.
    pub title: String,
    /// Commit message.
    pub message: String,
    pub body_size: i64,
    pub body_rows: i32,
    pub body_format: String,
    pub num_errors: i32,
}

/// Payload of an [`OpKind::Rename`] op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePayload {
    pub new_name: String,
}

/// Payload of an [`OpKind::Link`] op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub fsi_path: String,
}

/// Payload of an [`OpKind::KeyRotation`] op.
///
/// The certificate is a signature by the previously active key over
/// `KEY_ROTATION_CONTEXT || author_id || new_key`, binding the new key to
/// the stable author identity. The op itself is signed by the new key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotationPayload {
    pub new_key: PublicKey,
    pub cert: Signature,
}

impl KeyRotationPayload {
    /// The message the certificate signs.
    pub fn cert_message(author_id: &AuthorId, new_key: &PublicKey) -> Vec<u8> {
        let mut msg = Vec::with_capacity(KEY_ROTATION_CONTEXT.len() + 64);
        msg.extend_from_slice(KEY_ROTATION_CONTEXT);
        msg.extend_from_slice(author_id.as_bytes());
        msg.extend_from_slice(new_key.as_bytes());
        msg
    }
}

/// Payload of an [`OpKind::Acl`] op. The grant strings are opaque to
/// this subsystem; the kind is reserved so the wire format stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPayload {
    pub grants: Vec<String>,
}

/// The tagged payload variants, one per [`OpKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpPayload {
    Init(InitPayload),
    Commit(CommitPayload),
    Rename(RenamePayload),
    Delete,
    Publish,
    Unpublish,
    Link(LinkPayload),
    Unlink,
    KeyRotation(KeyRotationPayload),
    Acl(AclPayload),
}

impl OpPayload {
    /// The kind tag this payload belongs to.
    pub fn kind(&self) -> OpKind {
        match self {
            OpPayload::Init(_) => OpKind::Init,
            OpPayload::Commit(_) => OpKind::Commit,
            OpPayload::Rename(_) => OpKind::Rename,
            OpPayload::Delete => OpKind::Delete,
            OpPayload::Publish => OpKind::Publish,
            OpPayload::Unpublish => OpKind::Unpublish,
            OpPayload::Link(_) => OpKind::Link,
            OpPayload::Unlink => OpKind::Unlink,
            OpPayload::KeyRotation(_) => OpKind::KeyRotation,
            OpPayload::Acl(_) => OpKind::Acl,
        }
    }
}

/// A complete op: header fields + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// Author-claimed timestamp (Unix milliseconds), non-decreasing
    /// within one log.
    pub timestamp: i64,

    /// Hash of the predecessor op; `None` for a root op.
    pub prev: Option<Hash>,

    /// Digest of the author's origin public key; pinned across key
    /// rotations.
    pub author_id: AuthorId,

    /// The typed payload.
    pub payload: OpPayload,

    /// Ed25519 signature over the encoded header + payload.
    pub signature: Signature,
}

impl Op {
    /// The op's kind tag.
    pub fn kind(&self) -> OpKind {
        self.payload.kind()
    }

    /// Compute the op hash: Blake3 of the full encoded record, signature
    /// included.
    pub fn hash(&self) -> Hash {
        // Encoding an op we constructed cannot fail
        let bytes = encode_op(self).expect("op encodes");
        Hash::digest(&bytes)
    }

    /// Whether this op roots a log.
    pub fn is_init(&self) -> bool {
        self.kind() == OpKind::Init && self.prev.is_none()
    }

    /// Whether this op terminates a log.
    pub fn is_tombstone(&self) -> bool {
        self.kind() == OpKind::Delete
    }

    /// The message this op's signature covers.
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message_bytes(self).expect("op encodes")
    }
}

/// Builder for creating signed ops.
pub struct OpBuilder {
    timestamp: i64,
    prev: Option<Hash>,
    author_id: AuthorId,
    payload: OpPayload,
}

impl OpBuilder {
    /// Start building an op.
    pub fn new(author_id: AuthorId, payload: OpPayload) -> Self {
        Self {
            timestamp: 0,
            prev: None,
            author_id,
            payload,
        }
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the predecessor hash.
    pub fn prev(mut self, prev: Hash) -> Self {
        self.prev = Some(prev);
        self
    }

    /// Build and sign the op.
    pub fn sign(self, keypair: &Keypair) -> Op {
        let mut op = Op {
            timestamp: self.timestamp,
            prev: self.prev,
            author_id: self.author_id,
            payload: self.payload,
            signature: Signature::from_bytes([0u8; 64]),
        };
        let message = signed_message_bytes(&op).expect("op encodes");
        op.signature = keypair.sign(&message);
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_author() -> (Keypair, AuthorId) {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let author_id = AuthorId::from_pub_key(&keypair.public_key());
        (keypair, author_id)
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            OpKind::Init,
            OpKind::Commit,
            OpKind::Rename,
            OpKind::Delete,
            OpKind::Publish,
            OpKind::Unpublish,
            OpKind::Link,
            OpKind::Unlink,
            OpKind::KeyRotation,
            OpKind::Acl,
        ] {
            assert_eq!(OpKind::from_u8(kind.to_u8()), Some(kind));
        }
        assert_eq!(OpKind::from_u8(0x00), None);
        assert_eq!(OpKind::from_u8(0xff), None);
    }

    #[test]
    fn test_builder_signs_verifiable_op() {
        let (keypair, author_id) = test_author();
        let op = OpBuilder::new(
            author_id,
            OpPayload::Init(InitPayload {
                scope: InitScope::Dataset,
                name: "world_bank".into(),
                nonce: 7,
                origin_key: None,
            }),
        )
        .timestamp(1_700_000_000_000)
        .sign(&keypair);

        assert!(op.is_init());
        assert_eq!(op.kind(), OpKind::Init);
        keypair
            .public_key()
            .verify(&op.signed_message(), &op.signature)
            .expect("signature verifies");
    }

    #[test]
    fn test_hash_deterministic_and_content_addressed() {
        let (keypair, author_id) = test_author();
        let build = |nonce| {
            OpBuilder::new(
                author_id,
                OpPayload::Init(InitPayload {
                    scope: InitScope::Dataset,
                    name: "world_bank".into(),
                    nonce,
                    origin_key: None,
                }),
            )
            .timestamp(1_700_000_000_000)
            .sign(&keypair)
        };

        let a = build(1);
        assert_eq!(a.hash(), a.hash());
        assert_ne!(a.hash(), build(2).hash());
    }

    #[test]
    fn test_tombstone() {
        let (keypair, author_id) = test_author();
        let op = OpBuilder::new(author_id, OpPayload::Delete)
            .timestamp(1_700_000_000_000)
            .prev(Hash::digest(b"previous"))
            .sign(&keypair);

        assert!(op.is_tombstone());
        assert!(!op.is_init());
    }

    #[test]
    fn test_rotation_cert_message_binds_author_and_key() {
        let (_, author_id) = test_author();
        let new_key = Keypair::from_seed(&[0x43; 32]).public_key();
        let msg = KeyRotationPayload::cert_message(&author_id, &new_key);
        assert!(msg.starts_with(KEY_ROTATION_CONTEXT));
        assert_eq!(msg.len(), KEY_ROTATION_CONTEXT.len() + 64);
    }
}
