//! The dscache: a fast, compact view of current dataset state.
//!
//! The cache is derived entirely from the logbook (directly via
//! [`Dscache::rebuild`], or incrementally from bus events) and holds
//! nothing that cannot be re-derived, so losing it is never fatal. It is
//! eventually consistent: consumers that need strong answers ask the
//! logbook.
//!
//! Every mutation builds a fresh buffer off to the side and swaps it in
//! whole; readers observe either the pre- or post-state, never a partial
//! one. Saves are atomic (temp + rename) and save failures are logged,
//! not raised, because the logbook stays authoritative.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use quarry_core::dsref::{Ref, VersionInfo};
use quarry_core::event::{Bus, Event, EventType};
use quarry_core::ident::PROFILE_ID_LENGTH;
use quarry_core::resolve::{ResolveError, Resolver};

use crate::builder::{decode_cache, CacheBuf, CacheBuilder, RefEntry};
use crate::error::{DscacheError, Result};

/// In-memory handle on the serialized dataset index.
pub struct Dscache {
    filename: Option<PathBuf>,
    /// Whether a name-init event may create a cache from nothing. Off by
    /// default so nobody is forced into dscache without opting in.
    create_new_enabled: bool,
    inner: RwLock<Option<CacheBuf>>,
}

impl Dscache {
    /// Open a dscache, loading `filename` when it exists. A missing,
    /// corrupt, or version-mismatched file leaves the cache empty (the
    /// caller may [`Dscache::rebuild`] from the logbook).
    pub fn open(filename: Option<PathBuf>, create_new_enabled: bool) -> Self {
        let mut root = None;
        if let Some(path) = &filename {
            match std::fs::read(path) {
                Err(_) => {} // absence is fine, the cache is optional
                Ok(bytes) => match decode_cache(&bytes) {
                    Ok(table) => root = Some(CacheBuf { table, bytes }),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "ignoring unreadable dscache file"
                        );
                    }
                },
            }
        }
        Self {
            filename,
            create_new_enabled,
            inner: RwLock::new(root),
        }
    }

    /// An empty, in-memory cache.
    pub fn new_empty(create_new_enabled: bool) -> Self {
        Self::open(None, create_new_enabled)
    }

    /// Whether the cache holds any constructed data.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("dscache lock poisoned").is_none()
    }

    /// Register this cache's event handler on a bus.
    pub fn subscribe(self: &Arc<Self>, bus: &dyn Bus) {
        let cache = Arc::clone(self);
        bus.subscribe_types(
            &[
                EventType::DatasetNameInit,
                EventType::LogbookWriteCommit,
                EventType::DatasetDeleteAll,
                EventType::DatasetRename,
                EventType::DatasetCreateLink,
            ],
            Arc::new(move |event| {
                cache.handle_event(event).map_err(Into::into)
            }),
        );
    }

    /// Replace this cache's contents wholesale.
    pub fn assign(&self, other: CacheBuf) -> Result<()> {
        let mut inner = self.inner.write().expect("dscache lock poisoned");
        self.save(&other);
        *inner = Some(other);
        Ok(())
    }

    /// Discard the buffer and re-derive everything from a full logbook
    /// scan. The recovery path for a missed event or stale file.
    pub fn rebuild(&self, infos: &[VersionInfo]) -> Result<()> {
        let mut builder = CacheBuilder::new();
        for vi in infos {
            builder.add_user(&vi.username, &vi.profile_id);
            builder.add_version_info_with_indexes(vi, vi.commit_count, vi.commit_count);
        }
        self.assign(builder.build()?)
    }

    /// Current version info for every cached dataset.
    pub fn list_refs(&self) -> Result<Vec<VersionInfo>> {
        let inner = self.inner.read().expect("dscache lock poisoned");
        let buf = inner.as_ref().ok_or(DscacheError::NoDscache)?;
        Ok(buf
            .table
            .refs
            .iter()
            .map(|entry| {
                let username = buf.table.username_for(&entry.profile_id).unwrap_or("");
                entry.to_version_info(username)
            })
            .collect())
    }

    /// Look up the latest version info for a `username/name` reference.
    pub fn lookup_by_name(&self, r: &Ref) -> Result<VersionInfo> {
        let inner = self.inner.read().expect("dscache lock poisoned");
        let buf = inner.as_ref().ok_or(DscacheError::NoDscache)?;

        let profile_id = if r.profile_id.is_empty() {
            buf.table
                .profile_for(&r.username)
                .ok_or(DscacheError::RefNotFound)?
        } else {
            r.profile_id.as_str()
        };

        let entry = buf
            .table
            .refs
            .iter()
            .find(|e| e.profile_id == profile_id && e.pretty_name == r.name)
            .ok_or(DscacheError::RefNotFound)?;

        let username = buf.table.username_for(&entry.profile_id).unwrap_or("");
        Ok(entry.to_version_info(username))
    }

    /// Complete a reference from cached data. Nil-callable in the sense
    /// the resolver chain requires: an empty cache answers
    /// `ErrRefNotFound`, never panics.
    pub fn resolve(&self, r: &mut Ref) -> std::result::Result<String, ResolveError> {
        if self.is_empty() {
            return Err(ResolveError::NotFound);
        }

        if !r.init_id.is_empty() {
            return self.complete_ref(r);
        }

        let vi = self.lookup_by_name(r).map_err(|_| ResolveError::NotFound)?;
        r.init_id = vi.init_id;
        r.profile_id = vi.profile_id;
        r.username = vi.username;
        if r.path.is_empty() {
            r.path = vi.path;
        }
        Ok(String::new())
    }

    fn complete_ref(&self, r: &mut Ref) -> std::result::Result<String, ResolveError> {
        let inner = self.inner.read().expect("dscache lock poisoned");
        let buf = inner.as_ref().ok_or(ResolveError::NotFound)?;

        let entry = buf
            .table
            .refs
            .iter()
            .find(|e| e.init_id == r.init_id)
            .ok_or(ResolveError::NotFound)?;

        r.path = entry.head_ref.clone();
        r.profile_id = entry.profile_id.clone();
        r.name = entry.pretty_name.clone();
        if let Some(username) = buf.table.username_for(&entry.profile_id) {
            r.username = username.to_string();
        }
        Ok(String::new())
    }

    // ─────────────────────────────────────────────────────────────────
    // Event handling
    // ─────────────────────────────────────────────────────────────────

    fn handle_event(&self, event: &Event) -> Result<()> {
        let outcome = match event {
            Event::DatasetNameInit(vi) => self.update_init_dataset(vi),
            Event::LogbookWriteCommit(vi) => self.update_change_cursor(vi),
            Event::DatasetDeleteAll { init_id } => self.update_delete_dataset(init_id),
            Event::DatasetRename {
                init_id, new_name, ..
            } => self.update_rename_dataset(init_id, new_name),
            Event::DatasetCreateLink { init_id, fsi_path } => {
                self.update_link_dataset(init_id, fsi_path)
            }
        };
        match outcome {
            // An empty cache that is not allowed to self-create simply
            // stays empty; the logbook remains authoritative.
            Err(DscacheError::NoDscache) => Ok(()),
            other => other,
        }
    }

    /// A dataset was initialized: append a row with zeroed indexes, or
    /// build a minimal cache if creation from events is enabled.
    fn update_init_dataset(&self, vi: &VersionInfo) -> Result<()> {
        if vi.profile_id.len() != PROFILE_ID_LENGTH {
            return Err(DscacheError::InvalidProfileId);
        }

        let mut inner = self.inner.write().expect("dscache lock poisoned");
        let Some(buf) = inner.as_ref() else {
            if !self.create_new_enabled {
                return Ok(());
            }
            let mut builder = CacheBuilder::new();
            builder.add_user(&vi.username, &vi.profile_id);
            builder.add_version_info(vi);
            let built = builder.build()?;
            self.save(&built);
            *inner = Some(built);
            return Ok(());
        };

        let mut builder = CacheBuilder::new();
        for user in &buf.table.users {
            builder.add_user(&user.username, &user.profile_id);
        }
        builder.add_user(&vi.username, &vi.profile_id);
        for entry in &buf.table.refs {
            builder.add_entry(entry.clone());
        }
        builder.add_version_info(vi);

        let built = builder.build()?;
        self.save(&built);
        *inner = Some(built);
        Ok(())
    }

    /// A commit advanced a head: rebuild with the matching row replaced.
    fn update_change_cursor(&self, vi: &VersionInfo) -> Result<()> {
        self.replace_entry(&vi.init_id, |entry| {
            entry.top_index = vi.commit_count;
            entry.cursor_index = vi.commit_count;
            entry.meta_title = vi.meta_title.clone();
            entry.commit_time = vi.commit_time;
            entry.body_size = vi.body_size;
            entry.body_rows = vi.body_rows;
            entry.num_errors = vi.num_errors;
            entry.head_ref = vi.path.clone();
        })
    }

    /// A dataset was deleted: rebuild with the matching row omitted.
    fn update_delete_dataset(&self, init_id: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("dscache lock poisoned");
        let buf = inner.as_ref().ok_or(DscacheError::NoDscache)?;

        let mut builder = CacheBuilder::new();
        for user in &buf.table.users {
            builder.add_user(&user.username, &user.profile_id);
        }
        for entry in &buf.table.refs {
            if entry.init_id != init_id {
                builder.add_entry(entry.clone());
            }
        }

        let built = builder.build()?;
        self.save(&built);
        *inner = Some(built);
        Ok(())
    }

    /// A dataset was renamed: replace its pretty name.
    fn update_rename_dataset(&self, init_id: &str, new_name: &str) -> Result<()> {
        self.replace_entry(init_id, |entry| {
            entry.pretty_name = new_name.to_string();
        })
    }

    /// A working directory was linked.
    fn update_link_dataset(&self, init_id: &str, fsi_path: &str) -> Result<()> {
        self.replace_entry(init_id, |entry| {
            entry.fsi_path = fsi_path.to_string();
        })
    }

    /// Rebuild the buffer, applying `mutate` to the row matching
    /// `init_id`. Rows are copied as-is otherwise; a missing row leaves
    /// the cache unchanged.
    fn replace_entry(&self, init_id: &str, mutate: impl Fn(&mut RefEntry)) -> Result<()> {
        let mut inner = self.inner.write().expect("dscache lock poisoned");
        let buf = inner.as_ref().ok_or(DscacheError::NoDscache)?;

        let mut builder = CacheBuilder::new();
        for user in &buf.table.users {
            builder.add_user(&user.username, &user.profile_id);
        }
        for entry in &buf.table.refs {
            let mut entry = entry.clone();
            if entry.init_id == init_id {
                mutate(&mut entry);
            }
            builder.add_entry(entry);
        }

        let built = builder.build()?;
        self.save(&built);
        *inner = Some(built);
        Ok(())
    }

    /// Persist the buffer: temp + rename. Failures are logged and the
    /// next mutation retries, because the cache is rebuildable.
    fn save(&self, buf: &CacheBuf) {
        let Some(path) = &self.filename else {
            return;
        };
        let tmp = path.with_extension("qfb.tmp");
        let result = std::fs::write(&tmp, &buf.bytes).and_then(|_| std::fs::rename(&tmp, path));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to save dscache");
        }
    }
}

#[async_trait::async_trait]
impl Resolver for Dscache {
    async fn resolve_ref(&self, r: &mut Ref) -> std::result::Result<String, ResolveError> {
        self.resolve(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_A: &str = "QmaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaA";
    const PROFILE_B: &str = "QmbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbB";

    fn init_vi(init_id: &str, username: &str, profile_id: &str, name: &str) -> VersionInfo {
        VersionInfo::new_init(init_id, profile_id, username, name)
    }

    fn commit_vi(init_id: &str, path: &str, count: i32) -> VersionInfo {
        VersionInfo {
            init_id: init_id.into(),
            path: path.into(),
            commit_count: count,
            meta_title: "a title".into(),
            body_rows: 2,
            body_size: 17,
            commit_time: 1_700_000_000_000,
            ..Default::default()
        }
    }

    fn populated_cache() -> Dscache {
        let cache = Dscache::new_empty(true);
        cache
            .handle_event(&Event::DatasetNameInit(init_vi(
                "id1",
                "alice",
                PROFILE_A,
                "world_bank",
            )))
            .unwrap();
        cache
    }

    #[test]
    fn test_empty_cache_resolves_not_found() {
        let cache = Dscache::new_empty(false);
        let mut r = Ref::from_human("alice", "world_bank");
        assert!(cache.resolve(&mut r).unwrap_err().is_not_found());
        assert!(matches!(
            cache.list_refs(),
            Err(DscacheError::NoDscache)
        ));
    }

    #[test]
    fn test_create_new_disabled_stays_empty() {
        let cache = Dscache::new_empty(false);
        cache
            .handle_event(&Event::DatasetNameInit(init_vi(
                "id1",
                "alice",
                PROFILE_A,
                "world_bank",
            )))
            .unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_init_event_builds_cache() {
        let cache = populated_cache();
        assert!(!cache.is_empty());

        let mut r = Ref::from_human("alice", "world_bank");
        cache.resolve(&mut r).unwrap();
        assert_eq!(r.init_id, "id1");
        assert_eq!(r.profile_id, PROFILE_A);
        assert!(r.path.is_empty());
    }

    #[test]
    fn test_init_event_rejects_bad_profile_id() {
        let cache = Dscache::new_empty(true);
        let err = cache
            .handle_event(&Event::DatasetNameInit(init_vi(
                "id1", "alice", "short", "world_bank",
            )))
            .unwrap_err();
        assert!(matches!(err, DscacheError::InvalidProfileId));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_commit_event_updates_indexes_and_head() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::LogbookWriteCommit(commit_vi("id1", "/mem/QmP1", 1)))
            .unwrap();

        let infos = cache.list_refs().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].path, "/mem/QmP1");
        assert_eq!(infos[0].commit_count, 1);
        assert_eq!(infos[0].body_rows, 2);
        // Identity fields survive the rebuild.
        assert_eq!(infos[0].name, "world_bank");
        assert_eq!(infos[0].username, "alice");
    }

    #[test]
    fn test_commit_event_is_idempotent() {
        let cache = populated_cache();
        let event = Event::LogbookWriteCommit(commit_vi("id1", "/mem/QmP1", 1));
        cache.handle_event(&event).unwrap();
        let first = cache.list_refs().unwrap();
        cache.handle_event(&event).unwrap();
        assert_eq!(cache.list_refs().unwrap(), first);
    }

    #[test]
    fn test_delete_event_removes_entry() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::DatasetDeleteAll {
                init_id: "id1".into(),
            })
            .unwrap();
        assert!(cache.list_refs().unwrap().is_empty());

        let mut r = Ref::from_human("alice", "world_bank");
        assert!(cache.resolve(&mut r).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_event_replaces_pretty_name() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::DatasetRename {
                init_id: "id1".into(),
                old_name: "world_bank".into(),
                new_name: "wbp".into(),
            })
            .unwrap();

        let mut old = Ref::from_human("alice", "world_bank");
        assert!(cache.resolve(&mut old).unwrap_err().is_not_found());

        let mut new = Ref::from_human("alice", "wbp");
        cache.resolve(&mut new).unwrap();
        assert_eq!(new.init_id, "id1");
    }

    #[test]
    fn test_link_event_updates_fsi_path() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::DatasetCreateLink {
                init_id: "id1".into(),
                fsi_path: "/home/alice/world_bank".into(),
            })
            .unwrap();
        assert_eq!(cache.list_refs().unwrap()[0].fsi_path, "/home/alice/world_bank");
    }

    #[test]
    fn test_resolve_by_init_id_completes_fields() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::LogbookWriteCommit(commit_vi("id1", "/mem/QmP1", 1)))
            .unwrap();

        let mut r = Ref::from_init_id("id1");
        cache.resolve(&mut r).unwrap();
        assert_eq!(r.username, "alice");
        assert_eq!(r.name, "world_bank");
        assert_eq!(r.path, "/mem/QmP1");
    }

    #[test]
    fn test_two_authors_share_pretty_name() {
        let cache = populated_cache();
        cache
            .handle_event(&Event::DatasetNameInit(init_vi(
                "id2",
                "bob",
                PROFILE_B,
                "world_bank",
            )))
            .unwrap();

        let mut alice = Ref::from_human("alice", "world_bank");
        cache.resolve(&mut alice).unwrap();
        let mut bob = Ref::from_human("bob", "world_bank");
        cache.resolve(&mut bob).unwrap();

        assert_eq!(alice.init_id, "id1");
        assert_eq!(bob.init_id, "id2");
        assert_eq!(cache.list_refs().unwrap().len(), 2);
    }

    #[test]
    fn test_rebuild_from_scan_matches_event_replay() {
        // Replay events into one cache.
        let by_events = populated_cache();
        by_events
            .handle_event(&Event::LogbookWriteCommit(commit_vi("id1", "/mem/QmP1", 1)))
            .unwrap();

        // Full-scan rebuild of another from the resulting infos.
        let scanned = by_events.list_refs().unwrap();
        let by_scan = Dscache::new_empty(false);
        by_scan.rebuild(&scanned).unwrap();

        let a = by_events.inner.read().unwrap();
        let b = by_scan.inner.read().unwrap();
        assert_eq!(a.as_ref().unwrap().bytes, b.as_ref().unwrap().bytes);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dscache.qfb");

        {
            let cache = Dscache::open(Some(path.clone()), true);
            cache
                .handle_event(&Event::DatasetNameInit(init_vi(
                    "id1",
                    "alice",
                    PROFILE_A,
                    "world_bank",
                )))
                .unwrap();
        }
        assert!(path.exists());

        let cache = Dscache::open(Some(path), true);
        let mut r = Ref::from_human("alice", "world_bank");
        cache.resolve(&mut r).unwrap();
        assert_eq!(r.init_id, "id1");
    }

    #[test]
    fn test_stale_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dscache.qfb");
        std::fs::write(&path, b"junk that is not a cache").unwrap();

        let cache = Dscache::open(Some(path), false);
        assert!(cache.is_empty());
    }
}
