//! Navigation over the in-memory log forest.
//!
//! The logbook owns a flat arena of author logs. Datasets are addressed
//! by `(author index, dataset index)` handles; the [`Index`] maps stable
//! identifiers and usernames to those handles and is rebuilt whenever
//! the forest changes.

use std::collections::HashMap;

use quarry_core::dsref::VersionInfo;
use quarry_core::ident::{AuthorId, InitId};
use quarry_oplog::{InitScope, Log, OpPayload};

/// Handle of a dataset log inside the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DsHandle {
    pub author: usize,
    pub dataset: usize,
}

/// Derived lookup tables over the forest. Holds indexes only, never op
/// data.
#[derive(Debug, Default)]
pub(crate) struct Index {
    pub datasets: HashMap<InitId, DsHandle>,
    pub authors_by_name: HashMap<String, usize>,
    pub authors_by_id: HashMap<AuthorId, usize>,
}

impl Index {
    /// Rebuild every table from the forest.
    pub fn build(logs: &[Log]) -> Self {
        let mut index = Self::default();
        for (ai, author) in logs.iter().enumerate() {
            if let Some(author_id) = author.author_id() {
                index.authors_by_id.insert(author_id, ai);
            }
            if let Some(username) = author.init_name() {
                index.authors_by_name.insert(username.to_string(), ai);
            }
            for (di, dataset) in author.logs.iter().enumerate() {
                if let Some(id) = dataset.id() {
                    index
                        .datasets
                        .insert(InitId::from_hash(id), DsHandle { author: ai, dataset: di });
                }
            }
        }
        index
    }
}

/// The dataset's current pretty name: the newest Rename payload, or the
/// root init name.
pub(crate) fn current_name(dataset: &Log) -> Option<&str> {
    for op in dataset.ops.iter().rev() {
        if let OpPayload::Rename(rename) = &op.payload {
            return Some(rename.new_name.as_str());
        }
    }
    dataset.init_name()
}

/// Find the live dataset log currently carrying `name` under an author.
pub(crate) fn live_dataset_by_name<'a>(author: &'a Log, name: &str) -> Option<(usize, &'a Log)> {
    author
        .logs
        .iter()
        .enumerate()
        .find(|(_, ds)| !ds.is_deleted() && current_name(ds) == Some(name))
}

/// The dataset's main branch: the first branch-scoped child.
pub(crate) fn main_branch(dataset: &Log) -> Option<&Log> {
    main_branch_idx(dataset).map(|i| &dataset.logs[i])
}

/// Index of the main branch within the dataset's children.
pub(crate) fn main_branch_idx(dataset: &Log) -> Option<usize> {
    dataset
        .logs
        .iter()
        .position(|l| l.init_scope() == Some(InitScope::Branch))
}

/// Derive the flat [`VersionInfo`] for a dataset from its op history.
pub(crate) fn dataset_version_info(
    local_author: &AuthorId,
    username: &str,
    dataset: &Log,
) -> VersionInfo {
    let mut vi = VersionInfo {
        init_id: dataset
            .id()
            .map(|h| InitId::from_hash(h).to_hex())
            .unwrap_or_default(),
        profile_id: dataset
            .author_id()
            .map(|a| a.profile_id().to_string())
            .unwrap_or_default(),
        username: username.to_string(),
        name: current_name(dataset).unwrap_or_default().to_string(),
        foreign: dataset.author_id().as_ref() != Some(local_author),
        ..Default::default()
    };

    if let Some(branch) = main_branch(dataset) {
        for op in &branch.ops {
            match &op.payload {
                OpPayload::Commit(commit) => {
                    vi.commit_count += 1;
                    vi.path = commit.path.clone();
                    vi.meta_title = commit.title.clone();
                    vi.body_size = commit.body_size;
                    vi.body_rows = commit.body_rows;
                    vi.body_format = commit.body_format.clone();
                    vi.num_errors = commit.num_errors;
                    vi.commit_time = op.timestamp;
                }
                OpPayload::Publish => vi.published = true,
                OpPayload::Unpublish => vi.published = false,
                OpPayload::Link(link) => vi.fsi_path = link.fsi_path.clone(),
                OpPayload::Unlink => vi.fsi_path.clear(),
                _ => {}
            }
        }
    }

    vi
}

/// Clone an author log keeping only the named dataset child, the shape
/// logsync ships for a single-ref pull.
pub(crate) fn prune_to_dataset(author: &Log, init_id: &InitId) -> Log {
    Log {
        ops: author.ops.clone(),
        logs: author
            .logs
            .iter()
            .filter(|ds| ds.id().map(InitId::from_hash).as_ref() == Some(init_id))
            .cloned()
            .collect(),
    }
}
