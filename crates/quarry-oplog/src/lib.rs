//! # Quarry Oplog
//!
//! The append-only op chain: immutable, signed, hash-linked records and
//! the trees they form.
//!
//! An op is never edited or removed; changes are represented as new ops,
//! and deletes as tombstones. Each log is rooted at an Init op whose hash
//! becomes the log's permanent identity.
//!
//! ## Key Types
//!
//! - [`Op`] - A single signed record
//! - [`OpKind`] / [`OpPayload`] - The tagged op taxonomy
//! - [`Log`] - An op chain plus its nested child logs
//! - [`MergeOutcome`] - What applying a remote chain would do
//!
//! ## Encoding
//!
//! The wire and file encodings in [`encode`] are byte-exact: a decoded
//! log re-encodes to the same bytes, which is what keeps hashes and
//! signatures stable across nodes.

pub mod chain;
pub mod encode;
pub mod error;
pub mod log;
pub mod op;

pub use chain::{append_op, attested_keys, merge_chains, verify_chain, verify_log, MergeOutcome};
pub use encode::{
    decode_book, decode_log, decode_op, encode_book, encode_log, encode_op, signed_message_bytes,
    BOOK_MAGIC, BOOK_VERSION,
};
pub use error::OplogError;
pub use log::Log;
pub use op::{
    AclPayload, CommitPayload, InitPayload, InitScope, KeyRotationPayload, LinkPayload, Op,
    OpBuilder, OpKind, OpPayload, RenamePayload, KEY_ROTATION_CONTEXT,
};
