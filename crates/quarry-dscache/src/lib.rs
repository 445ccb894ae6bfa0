//! # Quarry Dscache
//!
//! A serialized flat index of current dataset state, derived from the
//! logbook and kept current by subscribing to its events.
//!
//! The dscache answers name → identity → head lookups without touching
//! op chains. It is a pure function of the logbook: every row can be
//! re-derived by a full scan, so the cache file is optional and cache
//! failures never block writers.

pub mod builder;
pub mod cache;
pub mod error;

pub use builder::{CacheBuf, CacheBuilder, RefEntry, Table, UserAssoc, CACHE_MAGIC, CACHE_VERSION};
pub use cache::Dscache;
pub use error::DscacheError;
