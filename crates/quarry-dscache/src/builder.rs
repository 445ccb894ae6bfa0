//! Building and serializing the cache table.
//!
//! The table serializes as a flat buffer: `QFBC` magic, a version word,
//! then the canonical-CBOR body. Entries are immutable once written;
//! every update builds a fresh table and replaces the whole buffer,
//! because variable-length fields cannot be mutated in place.

use serde::{Deserialize, Serialize};

use quarry_core::canonical::{from_canonical_slice, to_canonical_vec};
use quarry_core::dsref::VersionInfo;

use crate::error::{DscacheError, Result};

/// Magic bytes opening a dscache file.
pub const CACHE_MAGIC: [u8; 4] = *b"QFBC";

/// The dscache format version this build reads and writes.
pub const CACHE_VERSION: u16 = 1;

/// One username ↔ profileID association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssoc {
    pub username: String,
    pub profile_id: String,
}

/// One dataset row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEntry {
    pub init_id: String,
    pub profile_id: String,
    /// Highest commit index known.
    pub top_index: i32,
    /// The user's current working version; may lag `top_index`.
    pub cursor_index: i32,
    pub pretty_name: String,
    pub meta_title: String,
    pub theme_list: String,
    pub body_size: i64,
    pub body_rows: i32,
    pub body_format: String,
    pub num_errors: i32,
    pub commit_time: i64,
    pub head_ref: String,
    pub fsi_path: String,
    pub published: bool,
    pub foreign: bool,
}

impl RefEntry {
    /// Build a row from a flat version description.
    pub fn from_version_info(vi: &VersionInfo, top_index: i32, cursor_index: i32) -> Self {
        Self {
            init_id: vi.init_id.clone(),
            profile_id: vi.profile_id.clone(),
            top_index,
            cursor_index,
            pretty_name: vi.name.clone(),
            meta_title: vi.meta_title.clone(),
            theme_list: vi.theme_list.clone(),
            body_size: vi.body_size,
            body_rows: vi.body_rows,
            body_format: vi.body_format.clone(),
            num_errors: vi.num_errors,
            commit_time: vi.commit_time,
            head_ref: vi.path.clone(),
            fsi_path: vi.fsi_path.clone(),
            published: vi.published,
            foreign: vi.foreign,
        }
    }

    /// The flat version description of this row. The username is not
    /// stored per-row; the caller fills it from the user table.
    pub fn to_version_info(&self, username: &str) -> VersionInfo {
        VersionInfo {
            init_id: self.init_id.clone(),
            profile_id: self.profile_id.clone(),
            username: username.to_string(),
            name: self.pretty_name.clone(),
            path: self.head_ref.clone(),
            published: self.published,
            foreign: self.foreign,
            meta_title: self.meta_title.clone(),
            theme_list: self.theme_list.clone(),
            body_size: self.body_size,
            body_rows: self.body_rows,
            body_format: self.body_format.clone(),
            num_errors: self.num_errors,
            commit_time: self.commit_time,
            commit_count: self.top_index,
            fsi_path: self.fsi_path.clone(),
        }
    }
}

/// The deserialized cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub users: Vec<UserAssoc>,
    pub refs: Vec<RefEntry>,
}

impl Table {
    /// Username for a profileID, if associated.
    pub fn username_for(&self, profile_id: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.profile_id == profile_id)
            .map(|u| u.username.as_str())
    }

    /// ProfileID for a username, if associated.
    pub fn profile_for(&self, username: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.profile_id.as_str())
    }
}

/// The table plus its serialized form, swapped in as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBuf {
    pub table: Table,
    pub bytes: Vec<u8>,
}

/// Accumulates users and rows, then serializes once.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    users: Vec<UserAssoc>,
    refs: Vec<RefEntry>,
}

impl CacheBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a username ↔ profileID association, deduplicated.
    pub fn add_user(&mut self, username: &str, profile_id: &str) {
        if self.users.iter().any(|u| u.profile_id == profile_id) {
            return;
        }
        self.users.push(UserAssoc {
            username: username.to_string(),
            profile_id: profile_id.to_string(),
        });
    }

    /// Add a dataset row with zeroed indexes (a fresh init).
    pub fn add_version_info(&mut self, vi: &VersionInfo) {
        self.refs.push(RefEntry::from_version_info(vi, 0, 0));
    }

    /// Add a dataset row carrying explicit indexes.
    pub fn add_version_info_with_indexes(&mut self, vi: &VersionInfo, top: i32, cursor: i32) {
        self.refs.push(RefEntry::from_version_info(vi, top, cursor));
    }

    /// Add a pre-built row unchanged (wholesale copies during rebuild).
    pub fn add_entry(&mut self, entry: RefEntry) {
        self.refs.push(entry);
    }

    /// Serialize into a swappable buffer.
    pub fn build(self) -> Result<CacheBuf> {
        let table = Table {
            users: self.users,
            refs: self.refs,
        };
        let bytes = encode_cache(&table)?;
        Ok(CacheBuf { table, bytes })
    }
}

/// Encode a table: magic + version + reserved + canonical CBOR body.
pub fn encode_cache(table: &Table) -> Result<Vec<u8>> {
    let body = to_canonical_vec(table)?;
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.extend_from_slice(&CACHE_MAGIC);
    buf.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // reserved
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode a cache file.
pub fn decode_cache(bytes: &[u8]) -> Result<Table> {
    if bytes.len() < 8 {
        return Err(DscacheError::Corrupt("file too short".into()));
    }
    if bytes[..4] != CACHE_MAGIC {
        return Err(DscacheError::Corrupt("bad magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != CACHE_VERSION {
        return Err(DscacheError::UnsupportedVersion(version));
    }
    Ok(from_canonical_slice(&bytes[8..])?)
}
