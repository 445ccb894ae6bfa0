//! # Quarry Logbook
//!
//! The authoritative, append-only record of dataset history on a node.
//!
//! A [`Logbook`] keeps one signed log tree per author (author log →
//! dataset logs → branch logs), assigns every dataset the stable
//! identity of its root init op, and answers reference lookups from
//! that state. Every durable write publishes a typed event so derived
//! indexes (the dscache) stay current, and [`Logbook::merge_log`]
//! folds in verified log trees arriving from other nodes.

pub mod book;
pub mod error;
mod tree;

pub use book::{Clock, Logbook, LogbookOptions, MergeSummary};
pub use error::LogbookError;
