//! The logbook: the authoritative record of every dataset this node
//! knows about.
//!
//! One author log per author, dataset logs nested under it, branch logs
//! under those. All writes go through a single-writer lock, persist to
//! `logbook.qfb` (temp + rename), and only then publish events, so a
//! subscriber never observes state that did not reach disk.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;

use quarry_core::crypto::{Keypair, PublicKey};
use quarry_core::dsref::{Ref, VersionInfo};
use quarry_core::event::{Bus, Event};
use quarry_core::ident::{AuthorId, InitId, ProfileId};
use quarry_core::resolve::{ResolveError, Resolver};
use quarry_core::util::{check_list_params, paginate};
use quarry_oplog::{
    append_op, attested_keys, decode_book, encode_book, merge_chains, verify_log, CommitPayload,
    InitPayload, InitScope, KeyRotationPayload, LinkPayload, Log, MergeOutcome, Op, OpBuilder,
    OpPayload, OplogError, RenamePayload,
};

use crate::error::{LogbookError, Result};
use crate::tree::{
    current_name, dataset_version_info, live_dataset_by_name, main_branch_idx, prune_to_dataset,
    DsHandle, Index,
};

/// A time source, injectable for deterministic tests.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Construction options. Collaborators that would otherwise be process
/// globals (the clock, the init-nonce RNG) are explicit here.
#[derive(Default)]
pub struct LogbookOptions {
    /// Where to persist `logbook.qfb`. `None` keeps the book in memory
    /// only (tests, ephemeral nodes).
    pub path: Option<PathBuf>,
    /// Seed for the nonce RNG used when minting init ops.
    pub nonce_seed: Option<u64>,
    /// Clock override.
    pub clock: Option<Clock>,
}

/// What a merge changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    /// Authors this node had never seen.
    pub new_authors: usize,
    /// Dataset logs added under known or new authors.
    pub new_datasets: usize,
    /// Individual ops appended across all chains.
    pub new_ops: usize,
    /// InitIDs whose chains diverged; both heads were kept.
    pub diverged: Vec<String>,
}

impl MergeSummary {
    /// Whether the merge changed nothing (repeat merges land here).
    pub fn is_noop(&self) -> bool {
        self.new_authors == 0 && self.new_datasets == 0 && self.new_ops == 0
    }
}

struct Inner {
    /// The active signing key; replaced by key rotation.
    keypair: Keypair,
    /// One author log per known author; the local author's is created at
    /// open.
    logs: Vec<Log>,
    index: Index,
    nonce_rng: StdRng,
}

/// The authoritative store of dataset logs on a node.
pub struct Logbook {
    author_id: AuthorId,
    profile_id: ProfileId,
    username: String,
    bus: Arc<dyn Bus>,
    clock: Clock,
    path: Option<PathBuf>,
    inner: RwLock<Inner>,
}

impl Logbook {
    /// Open a logbook for the given author, loading `logbook.qfb` when
    /// present. A corrupt file is quarantined (renamed aside) and
    /// reported; it never takes the process down.
    pub fn open(
        keypair: Keypair,
        username: &str,
        bus: Arc<dyn Bus>,
        options: LogbookOptions,
    ) -> Result<Self> {
        let author_id = AuthorId::from_pub_key(&keypair.public_key());
        let profile_id = author_id.profile_id();
        let clock = options.clock.unwrap_or_else(|| Arc::new(now_millis));
        let mut nonce_rng = match options.nonce_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut logs = Vec::new();
        if let Some(path) = &options.path {
            if path.exists() {
                let bytes = std::fs::read(path)?;
                match decode_book(&bytes) {
                    Ok(loaded) => logs = loaded,
                    Err(e) => {
                        let quarantine = path.with_extension("qfb.corrupt");
                        tracing::error!(
                            error = %e,
                            quarantine = %quarantine.display(),
                            "logbook file failed verification, quarantining"
                        );
                        std::fs::rename(path, &quarantine)?;
                    }
                }
            }
        }

        // First open for this author: root their log.
        if !Index::build(&logs).authors_by_id.contains_key(&author_id) {
            let op = OpBuilder::new(
                author_id,
                OpPayload::Init(InitPayload {
                    scope: InitScope::Author,
                    name: username.to_string(),
                    nonce: nonce_rng.gen(),
                    origin_key: Some(keypair.public_key()),
                }),
            )
            .timestamp((*clock)())
            .sign(&keypair);
            logs.push(Log::new(op));
            persist(options.path.as_deref(), &logs)?;
        }

        Ok(Self {
            author_id,
            profile_id,
            username: username.to_string(),
            bus,
            clock,
            path: options.path,
            inner: RwLock::new(Inner {
                keypair,
                index: Index::build(&logs),
                logs,
                nonce_rng,
            }),
        })
    }

    /// The local author's stable identifier.
    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    /// The local author's digest.
    pub fn author_id(&self) -> AuthorId {
        self.author_id
    }

    /// The local author's username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The currently active public key (changes on rotation).
    pub async fn current_key(&self) -> PublicKey {
        self.inner.read().await.keypair.public_key()
    }

    /// Persist a staged forest, then swap it in. Nothing is observable
    /// until the bytes are durable.
    fn commit_staged(&self, inner: &mut Inner, staged: Vec<Log>) -> Result<()> {
        persist(self.path.as_deref(), &staged)?;
        inner.index = Index::build(&staged);
        inner.logs = staged;
        Ok(())
    }

    /// A timestamp for the next op in a chain: wall clock, clamped so
    /// per-log timestamps never decrease.
    fn next_timestamp(&self, ops: &[Op]) -> i64 {
        let now = (*self.clock)();
        ops.last().map(|op| op.timestamp.max(now)).unwrap_or(now)
    }

    fn local_author_idx(inner: &Inner, author_id: &AuthorId) -> Result<usize> {
        inner
            .index
            .authors_by_id
            .get(author_id)
            .copied()
            .ok_or(LogbookError::RefNotFound)
    }

    fn handle_for(&self, inner: &Inner, r: &Ref) -> Result<DsHandle> {
        if !r.init_id.is_empty() {
            let init_id = InitId::from_str(&r.init_id)
                .map_err(|_| LogbookError::InvalidName(r.init_id.clone()))?;
            return inner
                .index
                .datasets
                .get(&init_id)
                .copied()
                .ok_or(LogbookError::RefNotFound);
        }

        let author_idx = inner
            .index
            .authors_by_name
            .get(&r.username)
            .copied()
            .ok_or(LogbookError::RefNotFound)?;
        let (dataset, _) = live_dataset_by_name(&inner.logs[author_idx], &r.name)
            .ok_or(LogbookError::RefNotFound)?;
        Ok(DsHandle {
            author: author_idx,
            dataset,
        })
    }

    /// Require a live, locally-authored dataset.
    fn writable_dataset<'a>(&self, inner: &'a Inner, handle: DsHandle) -> Result<&'a Log> {
        let dataset = &inner.logs[handle.author].logs[handle.dataset];
        if dataset.author_id() != Some(self.author_id) {
            return Err(LogbookError::Unauthorized);
        }
        if dataset.is_deleted() {
            return Err(LogbookError::Deleted);
        }
        Ok(dataset)
    }

    // ─────────────────────────────────────────────────────────────────
    // Write API
    // ─────────────────────────────────────────────────────────────────

    /// Initialize a new dataset under `username/pretty_name`.
    ///
    /// Mints the dataset log (its root hash becomes the InitID) and the
    /// main branch log, then publishes `DatasetNameInit`.
    pub async fn write_dataset_init(&self, username: &str, pretty_name: &str) -> Result<String> {
        if username != self.username {
            return Err(LogbookError::Unauthorized);
        }
        validate_name(pretty_name)?;

        let mut inner = self.inner.write().await;
        let author_idx = Self::local_author_idx(&inner, &self.author_id)?;
        if live_dataset_by_name(&inner.logs[author_idx], pretty_name).is_some() {
            return Err(LogbookError::NameTaken(pretty_name.to_string()));
        }

        let ts = self.next_timestamp(&[]);
        let nonce: u64 = inner.nonce_rng.gen();
        let dataset_root = OpBuilder::new(
            self.author_id,
            OpPayload::Init(InitPayload {
                scope: InitScope::Dataset,
                name: pretty_name.to_string(),
                nonce,
                origin_key: None,
            }),
        )
        .timestamp(ts)
        .sign(&inner.keypair);

        let branch_nonce: u64 = inner.nonce_rng.gen();
        let branch_root = OpBuilder::new(
            self.author_id,
            OpPayload::Init(InitPayload {
                scope: InitScope::Branch,
                name: "main".to_string(),
                nonce: branch_nonce,
                origin_key: None,
            }),
        )
        .timestamp(ts)
        .sign(&inner.keypair);

        let init_id = InitId::from_hash(dataset_root.hash());
        let mut dataset = Log::new(dataset_root);
        dataset.logs.push(Log::new(branch_root));

        let mut staged = inner.logs.clone();
        staged[author_idx].logs.push(dataset);
        self.commit_staged(&mut inner, staged)?;

        let vi = VersionInfo::new_init(
            &init_id.to_hex(),
            self.profile_id.as_str(),
            &self.username,
            pretty_name,
        );
        self.bus.publish(&Event::DatasetNameInit(vi));

        Ok(init_id.to_hex())
    }

    /// Append a commit to the dataset's main branch and publish
    /// `LogbookWriteCommit`.
    pub async fn write_commit(&self, r: &Ref, meta: CommitPayload) -> Result<()> {
        let mut inner = self.inner.write().await;
        let handle = self.handle_for(&inner, r)?;
        let dataset = self.writable_dataset(&inner, handle)?;
        let branch_idx = main_branch_idx(dataset).ok_or(LogbookError::RefNotFound)?;
        let branch = &dataset.logs[branch_idx];

        let prev = branch.head().map(|op| op.hash());
        let ts = self.next_timestamp(&branch.ops);
        let mut builder =
            OpBuilder::new(self.author_id, OpPayload::Commit(meta)).timestamp(ts);
        if let Some(prev) = prev {
            builder = builder.prev(prev);
        }
        let op = builder.sign(&inner.keypair);

        let mut staged = inner.logs.clone();
        append_op(
            &mut staged[handle.author].logs[handle.dataset].logs[branch_idx].ops,
            op,
        )?;
        self.commit_staged(&mut inner, staged)?;

        let author = &inner.logs[handle.author];
        let username = author.init_name().unwrap_or_default();
        let vi = dataset_version_info(&self.author_id, username, &author.logs[handle.dataset]);
        self.bus.publish(&Event::LogbookWriteCommit(vi));
        Ok(())
    }

    /// Rename a dataset. Identity and head path are untouched; only the
    /// pretty name and timestamp advance.
    pub async fn write_rename(&self, init_id: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;

        let mut inner = self.inner.write().await;
        let handle = self.handle_for(&inner, &Ref::from_init_id(init_id))?;
        let dataset = self.writable_dataset(&inner, handle)?;
        let old_name = current_name(dataset).unwrap_or_default().to_string();

        if live_dataset_by_name(&inner.logs[handle.author], new_name).is_some() {
            return Err(LogbookError::NameTaken(new_name.to_string()));
        }

        let prev = dataset.head().map(|op| op.hash());
        let ts = self.next_timestamp(&dataset.ops);
        let mut builder = OpBuilder::new(
            self.author_id,
            OpPayload::Rename(RenamePayload {
                new_name: new_name.to_string(),
            }),
        )
        .timestamp(ts);
        if let Some(prev) = prev {
            builder = builder.prev(prev);
        }
        let op = builder.sign(&inner.keypair);

        let mut staged = inner.logs.clone();
        append_op(&mut staged[handle.author].logs[handle.dataset].ops, op)?;
        self.commit_staged(&mut inner, staged)?;

        self.bus.publish(&Event::DatasetRename {
            init_id: init_id.to_string(),
            old_name,
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    /// Tombstone a dataset. The log and its history survive; further
    /// writes are rejected with [`LogbookError::Deleted`].
    pub async fn write_delete_all(&self, init_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let handle = self.handle_for(&inner, &Ref::from_init_id(init_id))?;
        let dataset = self.writable_dataset(&inner, handle)?;

        let prev = dataset.head().map(|op| op.hash());
        let ts = self.next_timestamp(&dataset.ops);
        let mut builder = OpBuilder::new(self.author_id, OpPayload::Delete).timestamp(ts);
        if let Some(prev) = prev {
            builder = builder.prev(prev);
        }
        let op = builder.sign(&inner.keypair);

        let mut staged = inner.logs.clone();
        append_op(&mut staged[handle.author].logs[handle.dataset].ops, op)?;
        self.commit_staged(&mut inner, staged)?;

        self.bus.publish(&Event::DatasetDeleteAll {
            init_id: init_id.to_string(),
        });
        Ok(())
    }

    /// Record a working-directory link and publish `DatasetCreateLink`.
    pub async fn write_link(&self, init_id: &str, fsi_path: &str) -> Result<()> {
        self.append_branch_op(
            init_id,
            OpPayload::Link(LinkPayload {
                fsi_path: fsi_path.to_string(),
            }),
        )
        .await?;
        self.bus.publish(&Event::DatasetCreateLink {
            init_id: init_id.to_string(),
            fsi_path: fsi_path.to_string(),
        });
        Ok(())
    }

    /// Clear a working-directory link.
    pub async fn write_unlink(&self, init_id: &str) -> Result<()> {
        self.append_branch_op(init_id, OpPayload::Unlink).await
    }

    /// Mark the dataset published.
    pub async fn write_publish(&self, init_id: &str) -> Result<()> {
        self.append_branch_op(init_id, OpPayload::Publish).await
    }

    /// Retract a publish.
    pub async fn write_unpublish(&self, init_id: &str) -> Result<()> {
        self.append_branch_op(init_id, OpPayload::Unpublish).await
    }

    async fn append_branch_op(&self, init_id: &str, payload: OpPayload) -> Result<()> {
        let mut inner = self.inner.write().await;
        let handle = self.handle_for(&inner, &Ref::from_init_id(init_id))?;
        let dataset = self.writable_dataset(&inner, handle)?;
        let branch_idx = main_branch_idx(dataset).ok_or(LogbookError::RefNotFound)?;
        let branch = &dataset.logs[branch_idx];

        let prev = branch.head().map(|op| op.hash());
        let ts = self.next_timestamp(&branch.ops);
        let mut builder = OpBuilder::new(self.author_id, payload).timestamp(ts);
        if let Some(prev) = prev {
            builder = builder.prev(prev);
        }
        let op = builder.sign(&inner.keypair);

        let mut staged = inner.logs.clone();
        append_op(
            &mut staged[handle.author].logs[handle.dataset].logs[branch_idx].ops,
            op,
        )?;
        self.commit_staged(&mut inner, staged)
    }

    /// Rotate the signing key. The new key signs everything from here
    /// on; the profileID stays pinned to the origin key.
    pub async fn write_key_rotation(&self, new_keypair: &Keypair) -> Result<()> {
        let mut inner = self.inner.write().await;
        let author_idx = Self::local_author_idx(&inner, &self.author_id)?;
        let author = &inner.logs[author_idx];

        let cert_msg =
            KeyRotationPayload::cert_message(&self.author_id, &new_keypair.public_key());
        let cert = inner.keypair.sign(&cert_msg);

        let prev = author.head().map(|op| op.hash());
        let ts = self.next_timestamp(&author.ops);
        let mut builder = OpBuilder::new(
            self.author_id,
            OpPayload::KeyRotation(KeyRotationPayload {
                new_key: new_keypair.public_key(),
                cert,
            }),
        )
        .timestamp(ts);
        if let Some(prev) = prev {
            builder = builder.prev(prev);
        }
        let op = builder.sign(new_keypair);

        let mut staged = inner.logs.clone();
        append_op(&mut staged[author_idx].ops, op)?;
        self.commit_staged(&mut inner, staged)?;
        inner.keypair = new_keypair.clone();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Read API
    // ─────────────────────────────────────────────────────────────────

    /// Authoritative resolution: fill the missing fields of `r` from the
    /// log forest.
    pub async fn resolve(&self, r: &mut Ref) -> std::result::Result<String, ResolveError> {
        let inner = self.inner.read().await;

        let handle = if !r.init_id.is_empty() {
            let init_id = InitId::from_str(&r.init_id)
                .map_err(|_| ResolveError::InvalidRef(r.init_id.clone()))?;
            inner
                .index
                .datasets
                .get(&init_id)
                .copied()
                .ok_or(ResolveError::NotFound)?
        } else {
            if r.username.is_empty() || r.name.is_empty() {
                return Err(ResolveError::InvalidRef(r.to_string()));
            }
            let author_idx = inner
                .index
                .authors_by_name
                .get(&r.username)
                .copied()
                .ok_or(ResolveError::NotFound)?;
            let (dataset, _) = live_dataset_by_name(&inner.logs[author_idx], &r.name)
                .ok_or(ResolveError::NotFound)?;
            DsHandle {
                author: author_idx,
                dataset,
            }
        };

        let author = &inner.logs[handle.author];
        let dataset = &author.logs[handle.dataset];
        if dataset.is_deleted() {
            return Err(ResolveError::NotFound);
        }

        let username = author.init_name().unwrap_or_default();
        let vi = dataset_version_info(&self.author_id, username, dataset);
        r.init_id = vi.init_id;
        r.profile_id = vi.profile_id;
        r.username = vi.username;
        r.name = vi.name;
        if r.path.is_empty() {
            r.path = vi.path;
        }
        Ok(String::new())
    }

    /// The full op log for a fully-qualified ref: the author log pruned
    /// to the one dataset. This is what logsync ships.
    pub async fn dataset_ref(&self, r: &Ref) -> Result<Log> {
        let inner = self.inner.read().await;
        let handle = self.handle_for(&inner, r)?;
        let author = &inner.logs[handle.author];
        let init_id = author.logs[handle.dataset]
            .id()
            .map(InitId::from_hash)
            .ok_or(LogbookError::RefNotFound)?;
        Ok(prune_to_dataset(author, &init_id))
    }

    /// List current dataset versions, optionally filtered to one owner
    /// profile. `limit = -1` returns everything; offsets past the end
    /// return an empty list.
    pub async fn list_refs(
        &self,
        owner: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VersionInfo>> {
        check_list_params(limit, offset).map_err(LogbookError::List)?;

        let inner = self.inner.read().await;
        let mut infos = Vec::new();
        for author in &inner.logs {
            let username = author.init_name().unwrap_or_default();
            for dataset in &author.logs {
                if dataset.is_deleted() {
                    continue;
                }
                let vi = dataset_version_info(&self.author_id, username, dataset);
                if owner.map(|o| o == vi.profile_id).unwrap_or(true) {
                    infos.push(vi);
                }
            }
        }
        infos.sort_by(|a, b| (&a.username, &a.name).cmp(&(&b.username, &b.name)));
        Ok(paginate(&infos, limit, offset))
    }

    // ─────────────────────────────────────────────────────────────────
    // Merge
    // ─────────────────────────────────────────────────────────────────

    /// Merge a verified log tree from another node.
    ///
    /// The presented key must be one of the incoming author's attested
    /// keys, every signature must verify, and the fragment applies
    /// atomically: either the whole staged forest persists or nothing
    /// changes. Derived events republish after the save so downstream
    /// indexes catch up.
    pub async fn merge_log(&self, remote_key: &PublicKey, incoming: &Log) -> Result<MergeSummary> {
        if incoming.init_scope() != Some(InitScope::Author) {
            return Err(OplogError::Corrupt("fragment is not an author log".into()).into());
        }
        verify_log(incoming)?;

        let origin_key = match incoming.root().map(|op| &op.payload) {
            Some(OpPayload::Init(init)) => init
                .origin_key
                .ok_or_else(|| OplogError::Corrupt("author log root carries no origin key".into()))?,
            _ => return Err(OplogError::Corrupt("author log has no root".into()).into()),
        };
        let keys = attested_keys(&incoming.ops, &origin_key)?;
        if !keys.contains(remote_key) {
            return Err(LogbookError::Unauthorized);
        }

        let incoming_author = incoming.author_id().ok_or(LogbookError::RefNotFound)?;

        let mut inner = self.inner.write().await;
        let mut staged = inner.logs.clone();
        let mut summary = MergeSummary::default();
        let mut events = Vec::new();

        match inner.index.authors_by_id.get(&incoming_author).copied() {
            None => {
                summary.new_authors = 1;
                summary.new_datasets = incoming.logs.len();
                summary.new_ops = incoming.size();
                let username = incoming.init_name().unwrap_or_default();
                for dataset in &incoming.logs {
                    push_dataset_events(&self.author_id, username, dataset, &mut events);
                }
                staged.push(incoming.clone());
            }
            Some(author_idx) => {
                merge_author_log(
                    &self.author_id,
                    &mut staged[author_idx],
                    incoming,
                    &mut summary,
                    &mut events,
                )?;
            }
        }

        if summary.is_noop() {
            return Ok(summary);
        }

        self.commit_staged(&mut inner, staged)?;
        for event in &events {
            self.bus.publish(event);
        }
        Ok(summary)
    }

    /// Discard an author's entries for a dataset. Only the dataset's own
    /// author may request this.
    pub async fn remove_log(&self, requester: &AuthorId, r: &Ref) -> Result<()> {
        let mut inner = self.inner.write().await;
        let handle = self.handle_for(&inner, r)?;
        let dataset = &inner.logs[handle.author].logs[handle.dataset];
        if dataset.author_id() != Some(*requester) {
            return Err(LogbookError::Unauthorized);
        }
        let init_id = dataset
            .id()
            .map(|h| InitId::from_hash(h).to_hex())
            .unwrap_or_default();

        let mut staged = inner.logs.clone();
        staged[handle.author].logs.remove(handle.dataset);
        self.commit_staged(&mut inner, staged)?;

        self.bus.publish(&Event::DatasetDeleteAll { init_id });
        Ok(())
    }
}

#[async_trait::async_trait]
impl Resolver for Logbook {
    async fn resolve_ref(&self, r: &mut Ref) -> std::result::Result<String, ResolveError> {
        self.resolve(r).await
    }
}

/// Merge one incoming author log into the local copy, collecting events
/// for everything that changed.
fn merge_author_log(
    local_author: &AuthorId,
    local: &mut Log,
    incoming: &Log,
    summary: &mut MergeSummary,
    events: &mut Vec<Event>,
) -> Result<()> {
    // Author-level chain (rotations).
    match merge_chains(&local.ops, &incoming.ops) {
        MergeOutcome::NoOp => {}
        MergeOutcome::FastForward { from } => {
            summary.new_ops += incoming.ops.len() - from;
            local.ops.extend_from_slice(&incoming.ops[from..]);
        }
        MergeOutcome::Diverged { .. } => {
            summary
                .diverged
                .push(local.init_name().unwrap_or_default().to_string());
        }
    }

    let username = local.init_name().unwrap_or_default().to_string();

    for incoming_ds in &incoming.logs {
        let Some(ds_id) = incoming_ds.id() else {
            continue;
        };

        let Some(pos) = local.logs.iter().position(|ds| ds.id() == Some(ds_id)) else {
            summary.new_datasets += 1;
            summary.new_ops += incoming_ds.size();
            push_dataset_events(local_author, &username, incoming_ds, events);
            local.logs.push(incoming_ds.clone());
            continue;
        };

        let init_id_hex = InitId::from_hash(ds_id).to_hex();
        let local_ds = &mut local.logs[pos];
        let was_deleted = local_ds.is_deleted();
        let old_name = current_name(local_ds).unwrap_or_default().to_string();
        let mut commits_changed = false;

        // Dataset-level chain: renames and tombstones.
        match merge_chains(&local_ds.ops, &incoming_ds.ops) {
            MergeOutcome::NoOp => {}
            MergeOutcome::FastForward { from } => {
                summary.new_ops += incoming_ds.ops.len() - from;
                local_ds.ops.extend_from_slice(&incoming_ds.ops[from..]);
            }
            MergeOutcome::Diverged { .. } => {
                summary.diverged.push(init_id_hex.clone());
            }
        }

        // Branch chains, matched by root identity. Unknown branches are
        // extra heads and are kept whole.
        for incoming_branch in &incoming_ds.logs {
            let Some(branch_id) = incoming_branch.id() else {
                continue;
            };
            match local_ds
                .logs
                .iter()
                .position(|b| b.id() == Some(branch_id))
            {
                None => {
                    summary.new_ops += incoming_branch.size();
                    commits_changed = true;
                    local_ds.logs.push(incoming_branch.clone());
                }
                Some(bi) => match merge_chains(&local_ds.logs[bi].ops, &incoming_branch.ops) {
                    MergeOutcome::NoOp => {}
                    MergeOutcome::FastForward { from } => {
                        summary.new_ops += incoming_branch.ops.len() - from;
                        local_ds.logs[bi]
                            .ops
                            .extend_from_slice(&incoming_branch.ops[from..]);
                        commits_changed = true;
                    }
                    MergeOutcome::Diverged { .. } => {
                        summary.diverged.push(init_id_hex.clone());
                        summary.new_ops += incoming_branch.size();
                        local_ds.logs.push(incoming_branch.clone());
                    }
                },
            }
        }

        // Derived events, in causal order.
        let new_name = current_name(local_ds).unwrap_or_default().to_string();
        if new_name != old_name {
            events.push(Event::DatasetRename {
                init_id: init_id_hex.clone(),
                old_name,
                new_name,
            });
        }
        if local_ds.is_deleted() && !was_deleted {
            events.push(Event::DatasetDeleteAll {
                init_id: init_id_hex.clone(),
            });
        } else if commits_changed && !local_ds.is_deleted() {
            let vi = dataset_version_info(local_author, &username, local_ds);
            events.push(Event::LogbookWriteCommit(vi));
        }
    }

    Ok(())
}

/// Events announcing a dataset this node had never seen.
fn push_dataset_events(
    local_author: &AuthorId,
    username: &str,
    dataset: &Log,
    events: &mut Vec<Event>,
) {
    if dataset.is_deleted() {
        return;
    }
    let vi = dataset_version_info(local_author, username, dataset);
    events.push(Event::DatasetNameInit(VersionInfo::new_init(
        &vi.init_id,
        &vi.profile_id,
        &vi.username,
        &vi.name,
    )));
    if vi.commit_count > 0 {
        events.push(Event::LogbookWriteCommit(vi));
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 144
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(LogbookError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Atomic write of the whole forest: temp file, then rename.
fn persist(path: Option<&std::path::Path>, logs: &[Log]) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let bytes = encode_book(logs)?;
    let tmp = path.with_extension("qfb.tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Wall clock in Unix milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
