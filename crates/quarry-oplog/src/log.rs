//! Log: an ordered, append-only op chain plus its nested child logs.
//!
//! Logs form a tree: an author log holds dataset logs, a dataset log
//! holds branch logs, and commits live in the branch log. Each level is
//! rooted at its own Init op; a log's identity is the hash of that root.

use serde::{Deserialize, Serialize};

use quarry_core::crypto::Hash;
use quarry_core::ident::AuthorId;

use crate::op::{InitScope, Op, OpPayload};

/// An op chain and its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// This level's ops, root first.
    pub ops: Vec<Op>,
    /// Nested child logs.
    pub logs: Vec<Log>,
}

impl Log {
    /// A log rooted at a single op.
    pub fn new(root: Op) -> Self {
        Self {
            ops: vec![root],
            logs: Vec::new(),
        }
    }

    /// The root op, if the log is non-empty.
    pub fn root(&self) -> Option<&Op> {
        self.ops.first()
    }

    /// The most recent op.
    pub fn head(&self) -> Option<&Op> {
        self.ops.last()
    }

    /// The log's permanent identity: the hash of its root op.
    pub fn id(&self) -> Option<Hash> {
        self.root().map(|op| op.hash())
    }

    /// The author digest stamped on the root op.
    pub fn author_id(&self) -> Option<AuthorId> {
        self.root().map(|op| op.author_id)
    }

    /// The name carried by the root Init op, if this log is rooted at
    /// one.
    pub fn init_name(&self) -> Option<&str> {
        match self.root().map(|op| &op.payload) {
            Some(OpPayload::Init(init)) => Some(init.name.as_str()),
            _ => None,
        }
    }

    /// The scope of the root Init op.
    pub fn init_scope(&self) -> Option<InitScope> {
        match self.root().map(|op| &op.payload) {
            Some(OpPayload::Init(init)) => Some(init.scope),
            _ => None,
        }
    }

    /// Whether the chain ends in a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.head().map(Op::is_tombstone).unwrap_or(false)
    }

    /// Total op count, children included.
    pub fn size(&self) -> usize {
        self.ops.len() + self.logs.iter().map(Log::size).sum::<usize>()
    }
}
