//! # Quarry
//!
//! Peer-to-peer, versioned datasets. This crate wires the pieces into a
//! node and re-exports the public surface:
//!
//! - [`quarry_core`]: identifiers, references, events, resolver
//!   composition
//! - [`quarry_oplog`]: signed, hash-linked op chains
//! - [`quarry_logbook`]: the authoritative per-node log store
//! - [`quarry_dscache`]: the fast serialized index derived from it
//! - [`quarry_logsync`]: log transfer between peers
//!
//! A [`Node`] owns the bus, the logbook, and the dscache, keeps the
//! cache subscribed to logbook events, and hands out the canonical
//! resolver compositions.

mod node;

pub use node::{Node, NodeOptions};

pub use quarry_core::{
    Bus, Event, EventType, Hash, InitId, Keypair, MemBus, NilBus, ProfileId, PublicKey, Ref,
    ResolveError, Resolver, SequentialResolver, Signature, VersionInfo,
};
pub use quarry_dscache::{Dscache, DscacheError};
pub use quarry_logbook::{Logbook, LogbookError, LogbookOptions, MergeSummary};
pub use quarry_logsync::{HttpClient, Logsync, LogsyncError, Remote};
pub use quarry_oplog::{CommitPayload, Log, Op, OpKind, OplogError};
