//! Dataset references.
//!
//! A [`Ref`] is a partially-populated pointer at a dataset. Callers fill
//! in what they know (often just `username/name`) and resolvers complete
//! the rest. A [`VersionInfo`] is the flat description of a dataset's
//! current version, shared by event payloads, dscache rows, and listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdentError;

/// A reference to a dataset. Fields are empty strings until a resolver
/// fills them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Mutable display name of the dataset's author.
    pub username: String,
    /// Stable author identifier (base58 fingerprint).
    pub profile_id: String,
    /// Mutable dataset name within the author's namespace.
    pub name: String,
    /// Stable dataset identifier (hex).
    pub init_id: String,
    /// Content hash of the head version.
    pub path: String,
}

impl Ref {
    /// A reference carrying only human-readable fields.
    pub fn from_human(username: &str, name: &str) -> Self {
        Self {
            username: username.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// A reference carrying only a stable identifier.
    pub fn from_init_id(init_id: &str) -> Self {
        Self {
            init_id: init_id.to_string(),
            ..Default::default()
        }
    }

    /// A reference is fully resolved once both the stable identifier and
    /// the head path are known.
    pub fn is_fully_resolved(&self) -> bool {
        !self.init_id.is_empty() && !self.path.is_empty()
    }

    /// Whether any identifying field is set at all.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
            && self.profile_id.is_empty()
            && self.name.is_empty()
            && self.init_id.is_empty()
            && self.path.is_empty()
    }

    /// The `username/name` alias, the form used in ref strings and
    /// logsync query params.
    pub fn alias(&self) -> String {
        format!("{}/{}", self.username, self.name)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.username.is_empty() || !self.name.is_empty() {
            write!(f, "{}/{}", self.username, self.name)?;
            if !self.path.is_empty() {
                write!(f, "@{}", self.path)?;
            }
            return Ok(());
        }
        write!(f, "{}", self.init_id)
    }
}

impl FromStr for Ref {
    type Err = IdentError;

    /// Parse a `username/name` ref string, optionally suffixed with
    /// `@path`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alias, path) = match s.split_once('@') {
            Some((alias, path)) => (alias, path),
            None => (s, ""),
        };
        let (username, name) = alias
            .split_once('/')
            .ok_or_else(|| IdentError::InvalidRefString(s.to_string()))?;
        if username.is_empty() || name.is_empty() || name.contains('/') {
            return Err(IdentError::InvalidRefString(s.to_string()));
        }
        Ok(Self {
            username: username.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            ..Default::default()
        })
    }
}

/// Flat description of a dataset's current version.
///
/// This is what dscache rows serialize, what listing calls return, and
/// what init/commit events carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Stable dataset identifier (hex).
    pub init_id: String,
    /// Stable author identifier.
    pub profile_id: String,
    /// Author display name.
    pub username: String,
    /// Dataset display name.
    pub name: String,
    /// Content hash of the head version.
    pub path: String,
    /// Whether the author has published this dataset.
    pub published: bool,
    /// Whether the dataset belongs to another node's author.
    pub foreign: bool,
    /// Title from the head version's metadata.
    pub meta_title: String,
    /// Comma-separated theme keywords from metadata.
    pub theme_list: String,
    /// Body size in bytes.
    pub body_size: i64,
    /// Number of rows in the body.
    pub body_rows: i32,
    /// Body serialization format.
    pub body_format: String,
    /// Validation errors recorded against the head version.
    pub num_errors: i32,
    /// Unix-millisecond timestamp of the head commit.
    pub commit_time: i64,
    /// Number of commits in the history.
    pub commit_count: i32,
    /// Linked working-directory path, if checked out.
    pub fsi_path: String,
}

impl VersionInfo {
    /// Construct the minimal info a fresh init produces.
    pub fn new_init(init_id: &str, profile_id: &str, username: &str, name: &str) -> Self {
        Self {
            init_id: init_id.to_string(),
            profile_id: profile_id.to_string(),
            username: username.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// The [`Ref`] this info describes.
    pub fn to_ref(&self) -> Ref {
        Ref {
            username: self.username.clone(),
            profile_id: self.profile_id.clone(),
            name: self.name.clone(),
            init_id: self.init_id.clone(),
            path: self.path.clone(),
        }
    }
}
