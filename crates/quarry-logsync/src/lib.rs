//! # Quarry Logsync
//!
//! Bidirectional log transfer between peers: push, pull, and delete.
//!
//! The contract is the [`Remote`] trait (three verbs over any carrier);
//! [`http`] provides the HTTP rendition of it. Hosts authenticate
//! authors by their attested keys before merging anything, and every
//! merged fragment republishes events so derived indexes catch up.

pub mod error;
pub mod http;
mod logsync;

pub use error::LogsyncError;
pub use http::{router, HttpClient, AUTHOR_ID_HEADER, PUB_KEY_HEADER};
pub use logsync::{parse_ref_param, Author, Logsync, Remote};
