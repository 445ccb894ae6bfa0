//! Chain verification and merge.
//!
//! Verification recomputes the hash linkage and checks every signature
//! head-to-root before a chain is trusted. Merging classifies an incoming
//! chain against the local one; the caller applies the outcome
//! atomically under its writer lock.

use quarry_core::crypto::PublicKey;
use quarry_core::ident::AuthorId;

use crate::error::{OplogError, Result};
use crate::log::Log;
use crate::op::{KeyRotationPayload, Op, OpPayload};

/// What applying an incoming chain to a local one would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Incoming is identical to, or a prefix of, the local chain.
    NoOp,
    /// Local is a strict prefix of incoming: append `incoming[from..]`.
    FastForward { from: usize },
    /// Chains share a prefix then differ at op index `at`. Both branches
    /// are kept; the caller surfaces the fork.
    Diverged { at: usize },
}

/// Verify a single op chain: hash linkage, root shape, signatures, and
/// key-rotation certificates.
///
/// `origin_key` is the author's origin public key, the one the author
/// digest is pinned to. Rotation ops switch the active verification key
/// as the walk proceeds.
pub fn verify_chain(ops: &[Op], origin_key: &PublicKey) -> Result<()> {
    let Some(root) = ops.first() else {
        return Ok(());
    };

    if root.prev.is_some() {
        return Err(OplogError::Corrupt("root op has a predecessor".into()));
    }

    let author_id = AuthorId::from_pub_key(origin_key);
    let mut active_key = *origin_key;
    let mut prev_hash = None;

    for (i, op) in ops.iter().enumerate() {
        if op.author_id != author_id {
            return Err(OplogError::Corrupt(format!(
                "op {i} carries a foreign author digest"
            )));
        }
        if op.prev != prev_hash {
            return Err(OplogError::Corrupt(format!(
                "op {i} does not link to its predecessor"
            )));
        }

        if let OpPayload::KeyRotation(rotation) = &op.payload {
            // The previously active key must attest the new key before
            // it is trusted for anything, this op included.
            let cert_msg = KeyRotationPayload::cert_message(&author_id, &rotation.new_key);
            active_key
                .verify(&cert_msg, &rotation.cert)
                .map_err(|_| OplogError::Unauthorized)?;
            active_key = rotation.new_key;
        }

        active_key
            .verify(&op.signed_message(), &op.signature)
            .map_err(|_| OplogError::Corrupt(format!("op {i} signature does not verify")))?;

        prev_hash = Some(op.hash());
    }

    Ok(())
}

/// Collect the author's attested key set from an author chain: the
/// origin key plus every rotation target whose certificate checks out.
pub fn attested_keys(ops: &[Op], origin_key: &PublicKey) -> Result<Vec<PublicKey>> {
    let author_id = AuthorId::from_pub_key(origin_key);
    let mut keys = vec![*origin_key];
    for op in ops {
        if let OpPayload::KeyRotation(rotation) = &op.payload {
            let active = keys[keys.len() - 1];
            let cert_msg = KeyRotationPayload::cert_message(&author_id, &rotation.new_key);
            active
                .verify(&cert_msg, &rotation.cert)
                .map_err(|_| OplogError::Unauthorized)?;
            keys.push(rotation.new_key);
        }
    }
    Ok(keys)
}

/// Verify a child chain: same linkage rules, but the signature may
/// verify under any of the author's attested keys (a branch written
/// after a rotation is signed by the newer key).
fn verify_chain_any(ops: &[Op], author_id: &AuthorId, keys: &[PublicKey]) -> Result<()> {
    let Some(root) = ops.first() else {
        return Ok(());
    };
    if root.prev.is_some() {
        return Err(OplogError::Corrupt("root op has a predecessor".into()));
    }

    let mut prev_hash = None;
    for (i, op) in ops.iter().enumerate() {
        if op.author_id != *author_id {
            return Err(OplogError::Corrupt(format!(
                "op {i} carries a foreign author digest"
            )));
        }
        if op.prev != prev_hash {
            return Err(OplogError::Corrupt(format!(
                "op {i} does not link to its predecessor"
            )));
        }
        if matches!(op.payload, OpPayload::KeyRotation(_)) {
            return Err(OplogError::Corrupt(format!(
                "op {i} rotates a key outside the author log"
            )));
        }

        let message = op.signed_message();
        if !keys
            .iter()
            .rev()
            .any(|key| key.verify(&message, &op.signature).is_ok())
        {
            return Err(OplogError::Corrupt(format!(
                "op {i} signature does not verify"
            )));
        }

        prev_hash = Some(op.hash());
    }

    Ok(())
}

/// Verify an entire author log tree.
///
/// Author logs are self-certifying: the origin key rides in the root
/// Init payload and must hash to the root's author digest. Child chains
/// verify against the attested key set derived from the author chain.
pub fn verify_log(log: &Log) -> Result<()> {
    let Some(root) = log.root() else {
        return Err(OplogError::Corrupt("empty author log".into()));
    };
    let origin_key = match &root.payload {
        OpPayload::Init(init) => init
            .origin_key
            .ok_or_else(|| OplogError::Corrupt("author log root carries no origin key".into()))?,
        _ => {
            return Err(OplogError::Corrupt(
                "author log is not rooted at an init op".into(),
            ))
        }
    };
    if AuthorId::from_pub_key(&origin_key) != root.author_id {
        return Err(OplogError::Corrupt(
            "origin key does not match author digest".into(),
        ));
    }

    verify_chain(&log.ops, &origin_key)?;
    let keys = attested_keys(&log.ops, &origin_key)?;
    let author_id = root.author_id;
    for child in &log.logs {
        verify_subtree(child, &author_id, &keys)?;
    }
    Ok(())
}

fn verify_subtree(log: &Log, author_id: &AuthorId, keys: &[PublicKey]) -> Result<()> {
    verify_chain_any(&log.ops, author_id, keys)?;
    for child in &log.logs {
        verify_subtree(child, author_id, keys)?;
    }
    Ok(())
}

/// Append an op to a chain, enforcing linkage and ownership.
///
/// The op's `prev` must equal the hash of the current head, and a
/// non-root op must carry the same author digest as the chain it
/// extends.
pub fn append_op(ops: &mut Vec<Op>, op: Op) -> Result<()> {
    let expected = ops.last().map(|o| o.hash());
    if op.prev != expected {
        return Err(OplogError::BadChain(
            "op does not link to the chain head".into(),
        ));
    }
    if let Some(head) = ops.last() {
        if op.author_id != head.author_id {
            return Err(OplogError::Unauthorized);
        }
    }
    ops.push(op);
    Ok(())
}

/// Classify an incoming chain against the local one by hash alignment.
///
/// Applying the same chain twice is a no-op (detected by hash
/// equality), which makes merge idempotent.
pub fn merge_chains(local: &[Op], incoming: &[Op]) -> MergeOutcome {
    let shared = local.len().min(incoming.len());
    for i in 0..shared {
        if local[i].hash() != incoming[i].hash() {
            return MergeOutcome::Diverged { at: i };
        }
    }

    if incoming.len() > local.len() {
        MergeOutcome::FastForward { from: local.len() }
    } else {
        MergeOutcome::NoOp
    }
}
