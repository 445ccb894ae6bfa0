//! Host and client sides of log transfer.
//!
//! A [`Logsync`] wraps a logbook and exposes the three sync operations:
//! accept a pushed log (`put`), serve a pull (`get`), and honor an
//! author's removal request (`del`). The client entry points
//! ([`Logsync::push`], [`Logsync::pull`], [`Logsync::request_delete`])
//! drive the same operations against any [`Remote`] implementation; HTTP
//! is one transport, not the contract.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

use quarry_core::crypto::PublicKey;
use quarry_core::dsref::Ref;
use quarry_core::ident::ProfileId;
use quarry_logbook::{Logbook, MergeSummary};
use quarry_oplog::{attested_keys, decode_log, encode_log, OpPayload, OplogError};

use crate::error::{LogsyncError, Result};

/// An author identity as presented on the wire: the stable profileID
/// plus the public key the sender is currently using.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub profile_id: ProfileId,
    pub pub_key: PublicKey,
}

/// The transport contract: three verbs, any carrier.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Push a serialized log; the host answers with its own identity.
    async fn put(&self, author: &Author, body: Vec<u8>) -> Result<Author>;

    /// Pull the serialized log for a ref, along with the host identity.
    async fn get(&self, author: &Author, r: &Ref) -> Result<(Author, Vec<u8>)>;

    /// Ask the host to drop the sender's entries for a ref.
    async fn del(&self, author: &Author, r: &Ref) -> Result<()>;
}

/// Log transfer over a logbook.
pub struct Logsync {
    book: Arc<Logbook>,
}

impl Logsync {
    /// Wrap a logbook.
    pub fn new(book: Arc<Logbook>) -> Self {
        Self { book }
    }

    /// The underlying logbook.
    pub fn book(&self) -> &Arc<Logbook> {
        &self.book
    }

    /// This node's wire identity.
    pub async fn author(&self) -> Author {
        Author {
            profile_id: self.book.profile_id().clone(),
            pub_key: self.book.current_key().await,
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // Host side
    // ─────────────────────────────────────────────────────────────────

    /// Accept a pushed log. The sender's key must be attested for the
    /// log's author; verification failures reject the whole fragment.
    pub async fn put(&self, sender: &Author, body: &[u8]) -> Result<MergeSummary> {
        let (log, used) = decode_log(body)?;
        if used != body.len() {
            return Err(OplogError::Malformed("trailing bytes after log".into()).into());
        }
        Ok(self.book.merge_log(&sender.pub_key, &log).await?)
    }

    /// Serve the serialized log for a ref.
    pub async fn get(&self, _sender: &Author, r: &Ref) -> Result<Vec<u8>> {
        let log = self
            .book
            .dataset_ref(r)
            .await
            .map_err(|_| LogsyncError::RefNotFound)?;
        Ok(encode_log(&log)?)
    }

    /// Drop an author's entries for a ref. Only permitted when the
    /// sender can prove they are that author: the presented key must be
    /// attested by the author's own log.
    pub async fn del(&self, sender: &Author, r: &Ref) -> Result<()> {
        let log = self
            .book
            .dataset_ref(r)
            .await
            .map_err(|_| LogsyncError::RefNotFound)?;

        let author_id = sender.profile_id.author_id();
        if log.author_id() != Some(author_id) {
            return Err(LogsyncError::Unauthorized);
        }
        if !log_attests_key(&log, &sender.pub_key)? {
            return Err(LogsyncError::Unauthorized);
        }

        self.book.remove_log(&author_id, r).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Client side
    // ─────────────────────────────────────────────────────────────────

    /// Push the log for `r` to a remote.
    pub async fn push(&self, remote: &dyn Remote, r: &Ref) -> Result<Author> {
        let log = self
            .book
            .dataset_ref(r)
            .await
            .map_err(|_| LogsyncError::RefNotFound)?;
        let body = encode_log(&log)?;
        remote.put(&self.author().await, body).await
    }

    /// Pull the log for `r` from a remote and merge it.
    ///
    /// Pulled logs are self-certifying: the merge verifies the embedded
    /// origin key and its rotation chain, so a relaying host does not
    /// need to be the author.
    pub async fn pull(&self, remote: &dyn Remote, r: &Ref) -> Result<MergeSummary> {
        let (_host, body) = remote.get(&self.author().await, r).await?;
        let (log, used) = decode_log(&body)?;
        if used != body.len() {
            return Err(OplogError::Malformed("trailing bytes after log".into()).into());
        }
        let origin_key = log_origin_key(&log)?;
        Ok(self.book.merge_log(&origin_key, &log).await?)
    }

    /// Ask a remote to drop this node's entries for `r`.
    pub async fn request_delete(&self, remote: &dyn Remote, r: &Ref) -> Result<()> {
        remote.del(&self.author().await, r).await
    }
}

/// The origin key embedded in an author log root.
fn log_origin_key(log: &quarry_oplog::Log) -> Result<PublicKey> {
    match log.root().map(|op| &op.payload) {
        Some(OpPayload::Init(init)) => init.origin_key.ok_or_else(|| {
            OplogError::Corrupt("author log root carries no origin key".into()).into()
        }),
        _ => Err(OplogError::Corrupt("fragment is not an author log".into()).into()),
    }
}

/// Whether `key` is the origin key or an attested rotation target of the
/// log's author chain.
fn log_attests_key(log: &quarry_oplog::Log, key: &PublicKey) -> Result<bool> {
    let origin = log_origin_key(log)?;
    let keys = attested_keys(&log.ops, &origin)?;
    Ok(keys.contains(key))
}

/// Parse the `ref` query parameter: `username/name`, or a bare InitID.
pub fn parse_ref_param(s: &str) -> Result<Ref> {
    if s.is_empty() {
        return Err(LogsyncError::BadHeaders("missing ref".into()));
    }
    if s.contains('/') {
        return Ref::from_str(s).map_err(|e| LogsyncError::BadHeaders(e.to_string()));
    }
    Ok(Ref::from_init_id(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::crypto::Keypair;
    use quarry_core::event::NilBus;
    use quarry_logbook::LogbookOptions;
    use quarry_oplog::CommitPayload;

    fn test_book(seed: u8, username: &str) -> Arc<Logbook> {
        let keypair = Keypair::from_seed(&[seed; 32]);
        Arc::new(
            Logbook::open(
                keypair,
                username,
                Arc::new(NilBus),
                LogbookOptions {
                    nonce_seed: Some(seed as u64),
                    clock: Some(Arc::new(|| 1_700_000_000_000)),
                    ..Default::default()
                },
            )
            .expect("open in-memory logbook"),
        )
    }

    /// A remote that calls straight into another node's host side.
    struct Loopback {
        host: Arc<Logsync>,
    }

    #[async_trait]
    impl Remote for Loopback {
        async fn put(&self, author: &Author, body: Vec<u8>) -> Result<Author> {
            self.host.put(author, &body).await?;
            Ok(self.host.author().await)
        }

        async fn get(&self, author: &Author, r: &Ref) -> Result<(Author, Vec<u8>)> {
            let body = self.host.get(author, r).await?;
            Ok((self.host.author().await, body))
        }

        async fn del(&self, author: &Author, r: &Ref) -> Result<()> {
            self.host.del(author, r).await
        }
    }

    async fn seeded_alice() -> (Arc<Logsync>, String) {
        let book = test_book(1, "alice");
        let init_id = book.write_dataset_init("alice", "world_bank").await.unwrap();
        book.write_commit(
            &Ref::from_init_id(&init_id),
            CommitPayload {
                path: "/mem/QmP1".into(),
                body_rows: 2,
                body_size: 17,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (Arc::new(Logsync::new(book)), init_id)
    }

    #[tokio::test]
    async fn test_push_then_host_resolves() {
        let (alice, init_id) = seeded_alice().await;
        let server = Arc::new(Logsync::new(test_book(2, "server")));
        let remote = Loopback {
            host: server.clone(),
        };

        let host_author = alice
            .push(&remote, &Ref::from_human("alice", "world_bank"))
            .await
            .unwrap();
        assert_eq!(host_author.profile_id, *server.book().profile_id());

        let mut r = Ref::from_human("alice", "world_bank");
        server.book().resolve(&mut r).await.unwrap();
        assert_eq!(r.init_id, init_id);
        assert_eq!(r.path, "/mem/QmP1");
    }

    #[tokio::test]
    async fn test_push_is_idempotent() {
        let (alice, _) = seeded_alice().await;
        let server = Arc::new(Logsync::new(test_book(2, "server")));
        let remote = Loopback {
            host: server.clone(),
        };
        let r = Ref::from_human("alice", "world_bank");

        alice.push(&remote, &r).await.unwrap();
        alice.push(&remote, &r).await.unwrap();
        assert_eq!(server.book().list_refs(None, -1, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_merges_remote_log() {
        let (alice, init_id) = seeded_alice().await;
        let bob = Arc::new(Logsync::new(test_book(2, "bob")));
        let remote = Loopback {
            host: alice.clone(),
        };

        let summary = bob
            .pull(&remote, &Ref::from_human("alice", "world_bank"))
            .await
            .unwrap();
        assert!(!summary.is_noop());

        let mut r = Ref::from_human("alice", "world_bank");
        bob.book().resolve(&mut r).await.unwrap();
        assert_eq!(r.init_id, init_id);
    }

    #[tokio::test]
    async fn test_put_rejects_impostor_key() {
        let (alice, _) = seeded_alice().await;
        let server = Logsync::new(test_book(2, "server"));

        let body = alice
            .get(
                &alice.author().await,
                &Ref::from_human("alice", "world_bank"),
            )
            .await
            .unwrap();

        let impostor = Author {
            profile_id: alice.author().await.profile_id,
            pub_key: Keypair::from_seed(&[9; 32]).public_key(),
        };
        assert!(matches!(
            server.put(&impostor, &body).await,
            Err(LogsyncError::Logbook(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_ref_is_not_found() {
        let (alice, _) = seeded_alice().await;
        let err = alice
            .get(&alice.author().await, &Ref::from_human("ghost", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, LogsyncError::RefNotFound));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_delete_requires_the_author() {
        let (alice, _) = seeded_alice().await;
        let server = Arc::new(Logsync::new(test_book(2, "server")));
        let remote = Loopback {
            host: server.clone(),
        };
        let r = Ref::from_human("alice", "world_bank");
        alice.push(&remote, &r).await.unwrap();

        // A different author may not delete alice's entries.
        let mallory = Logsync::new(test_book(3, "mallory"));
        assert!(matches!(
            mallory.request_delete(&remote, &r).await,
            Err(LogsyncError::Unauthorized)
        ));

        // Alice may.
        alice.request_delete(&remote, &r).await.unwrap();
        let mut gone = Ref::from_human("alice", "world_bank");
        assert!(server.book().resolve(&mut gone).await.is_err());
    }

    #[test]
    fn test_parse_ref_param() {
        let r = parse_ref_param("alice/world_bank").unwrap();
        assert_eq!(r.username, "alice");

        let r = parse_ref_param("deadbeef").unwrap();
        assert_eq!(r.init_id, "deadbeef");

        assert!(parse_ref_param("").is_err());
        assert!(parse_ref_param("/broken").is_err());
    }
}
