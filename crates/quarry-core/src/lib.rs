//! # Quarry Core
//!
//! Shared primitives for the quarry dataset platform: identifiers,
//! references, cryptography, canonical encoding, the event bus, and
//! resolver composition.
//!
//! This crate contains no persistence and no networking. Everything that
//! touches disk or peers lives in the `quarry-oplog`, `quarry-logbook`,
//! `quarry-dscache`, and `quarry-logsync` crates.
//!
//! ## Key Types
//!
//! - [`InitId`] - Stable, content-addressed dataset identifier
//! - [`ProfileId`] - Base58 fingerprint of an author's origin public key
//! - [`Ref`] - Partial dataset reference that resolvers complete
//! - [`VersionInfo`] - Flat description of a dataset's current version
//! - [`Bus`] - Typed pub/sub mediating logbook → cache updates
//! - [`Resolver`] - The `resolve_ref` contract, composable sequentially

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod dsref;
pub mod event;
pub mod ident;
pub mod resolve;
pub mod util;

pub use crypto::{Hash, Keypair, PublicKey, Signature};
pub use dsref::{Ref, VersionInfo};
pub use event::{Bus, Event, EventType, MemBus, NilBus};
pub use ident::{AuthorId, InitId, ProfileId, PROFILE_ID_LENGTH};
pub use resolve::{ResolveError, Resolver, SequentialResolver};
