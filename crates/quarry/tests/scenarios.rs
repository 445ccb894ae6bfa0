//! End-to-end scenarios across the whole stack: logbook writes feeding
//! the dscache over the bus, resolver composition, and multi-node
//! convergence through logsync.

use std::sync::Arc;

use quarry::{
    Keypair, Node, NodeOptions, Ref, ResolveError, Resolver, SequentialResolver, VersionInfo,
};
use quarry_logsync::Logsync;
use quarry_testkit::fixtures::{sample_commit, FIXED_NOW};

fn open_node(seed: u8, username: &str) -> Node {
    Node::open(
        Keypair::from_seed(&[seed; 32]),
        username,
        NodeOptions {
            cache_create_enabled: true,
            nonce_seed: Some(seed as u64),
            clock: Some(Arc::new(|| FIXED_NOW)),
            ..Default::default()
        },
    )
    .expect("open in-memory node")
}

/// S1: init, then resolve through both the logbook and the cache.
#[tokio::test]
async fn scenario_init_and_resolve() {
    let node = open_node(1, "alice");
    let init_id = node
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();

    // Authoritative answer.
    let mut r = Ref::from_human("alice", "world_bank");
    node.book.resolve(&mut r).await.unwrap();
    assert_eq!(r.init_id, init_id);
    assert!(r.path.is_empty());

    // The cache heard the event and answers identically.
    let mut cached = Ref::from_human("alice", "world_bank");
    node.cache.resolve(&mut cached).unwrap();
    assert_eq!(cached.init_id, init_id);
}

/// S2: a commit advances the head everywhere.
#[tokio::test]
async fn scenario_commit_updates_head() {
    let node = open_node(1, "alice");
    let init_id = node
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();
    node.book
        .write_commit(&Ref::from_init_id(&init_id), sample_commit("/mem/QmP1"))
        .await
        .unwrap();

    let mut r = Ref::from_init_id(&init_id);
    node.book.resolve(&mut r).await.unwrap();
    assert_eq!(r.path, "/mem/QmP1");

    let infos = node.cache.list_refs().unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].commit_count, 1);
    assert_eq!(infos[0].path, "/mem/QmP1");
    assert_eq!(infos[0].body_rows, 2);
}

/// S3: rename changes the name, never the identity.
#[tokio::test]
async fn scenario_rename_preserves_identity() {
    let node = open_node(1, "alice");
    let init_id = node
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();
    node.book
        .write_commit(&Ref::from_init_id(&init_id), sample_commit("/mem/QmP1"))
        .await
        .unwrap();

    node.book.write_rename(&init_id, "wbp").await.unwrap();

    for resolver_name in ["book", "cache"] {
        let mut old = Ref::from_human("alice", "world_bank");
        let err = if resolver_name == "book" {
            node.book.resolve(&mut old).await.unwrap_err()
        } else {
            node.cache.resolve(&mut old).unwrap_err()
        };
        assert!(err.is_not_found(), "{resolver_name} still knows the old name");

        let mut new = Ref::from_human("alice", "wbp");
        if resolver_name == "book" {
            node.book.resolve(&mut new).await.unwrap();
        } else {
            node.cache.resolve(&mut new).unwrap();
        }
        assert_eq!(new.init_id, init_id);
        assert_eq!(new.path, "/mem/QmP1");
    }
}

/// S4: delete tombstones the dataset and empties every view.
#[tokio::test]
async fn scenario_delete_tombstones() {
    let node = open_node(1, "alice");
    let init_id = node
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();
    node.book.write_delete_all(&init_id).await.unwrap();

    let mut by_name = Ref::from_human("alice", "world_bank");
    assert!(node.book.resolve(&mut by_name).await.unwrap_err().is_not_found());
    assert!(node.cache.resolve(&mut by_name).unwrap_err().is_not_found());

    assert!(node
        .book
        .write_commit(&Ref::from_init_id(&init_id), sample_commit("/mem/Qm"))
        .await
        .is_err());
    assert!(node.cache.list_refs().unwrap().is_empty());
}

/// S5: a merged log resolves identically on both peers; repeating the
/// merge is a no-op.
#[tokio::test]
async fn scenario_merge_convergence() {
    let alice = open_node(1, "alice");
    let init_id = alice
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();
    alice
        .book
        .write_commit(&Ref::from_init_id(&init_id), sample_commit("/mem/QmP1"))
        .await
        .unwrap();
    alice.book.write_rename(&init_id, "wbp").await.unwrap();

    let fragment = alice
        .book
        .dataset_ref(&Ref::from_human("alice", "wbp"))
        .await
        .unwrap();
    let alice_key = alice.book.current_key().await;

    let bob = open_node(2, "bob");
    let summary = bob.book.merge_log(&alice_key, &fragment).await.unwrap();
    assert!(!summary.is_noop());

    let mut on_bob = Ref::from_human("alice", "wbp");
    bob.book.resolve(&mut on_bob).await.unwrap();
    let mut on_alice = Ref::from_human("alice", "wbp");
    alice.book.resolve(&mut on_alice).await.unwrap();
    assert_eq!(on_bob.init_id, on_alice.init_id);
    assert_eq!(on_bob.path, on_alice.path);

    let again = bob.book.merge_log(&alice_key, &fragment).await.unwrap();
    assert!(again.is_noop());
}

/// S6: two authors can share a pretty name; both resolve independently
/// after a mutual sync.
#[tokio::test]
async fn scenario_divergent_authors_share_name() {
    let alice = open_node(1, "alice");
    let bob = open_node(2, "bob");

    let alice_id = alice
        .book
        .write_dataset_init("alice", "wbp")
        .await
        .unwrap();
    let bob_id = bob.book.write_dataset_init("bob", "wbp").await.unwrap();

    let alice_fragment = alice
        .book
        .dataset_ref(&Ref::from_human("alice", "wbp"))
        .await
        .unwrap();
    let bob_fragment = bob
        .book
        .dataset_ref(&Ref::from_human("bob", "wbp"))
        .await
        .unwrap();

    bob.book
        .merge_log(&alice.book.current_key().await, &alice_fragment)
        .await
        .unwrap();
    alice
        .book
        .merge_log(&bob.book.current_key().await, &bob_fragment)
        .await
        .unwrap();

    for node in [&alice, &bob] {
        let mut a = Ref::from_human("alice", "wbp");
        node.book.resolve(&mut a).await.unwrap();
        assert_eq!(a.init_id, alice_id);

        let mut b = Ref::from_human("bob", "wbp");
        node.book.resolve(&mut b).await.unwrap();
        assert_eq!(b.init_id, bob_id);

        let infos = node.book.list_refs(None, -1, 0).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_ne!(infos[0].init_id, infos[1].init_id);
    }
}

/// S7: listing pagination bounds.
#[tokio::test]
async fn scenario_list_pagination() {
    let node = open_node(1, "alice");
    for i in 0..10 {
        node.book
            .write_dataset_init("alice", &format!("ds_{i:02}"))
            .await
            .unwrap();
    }
    let owner = node.book.profile_id().to_string();

    let names = |infos: Vec<VersionInfo>| -> Vec<String> {
        infos.into_iter().map(|vi| vi.name).collect()
    };

    assert_eq!(
        names(node.book.list_refs(Some(&owner), 4, 0).await.unwrap()),
        ["ds_00", "ds_01", "ds_02", "ds_03"]
    );
    assert_eq!(
        names(node.book.list_refs(Some(&owner), 4, 4).await.unwrap()),
        ["ds_04", "ds_05", "ds_06", "ds_07"]
    );
    assert_eq!(
        names(node.book.list_refs(Some(&owner), 4, 8).await.unwrap()),
        ["ds_08", "ds_09"]
    );
    assert_eq!(node.book.list_refs(Some(&owner), -1, 0).await.unwrap().len(), 10);
    assert!(node.book.list_refs(Some(&owner), 0, 0).await.unwrap().is_empty());
    assert!(node.book.list_refs(Some(&owner), 4, 100).await.unwrap().is_empty());

    let err = node.book.list_refs(Some(&owner), -10, 0).await.unwrap_err();
    assert_eq!(err.to_string(), "limit of -10 is out of bounds");
}

/// The local composition answers from the cache first and falls back to
/// the logbook; missing resolvers are skipped, and an entirely empty
/// node reports not-found.
#[tokio::test]
async fn scenario_resolver_composition() {
    let node = open_node(1, "alice");
    let init_id = node
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();

    let resolver = node.local_resolver();
    let mut r = Ref::from_human("alice", "world_bank");
    resolver.resolve_ref(&mut r).await.unwrap();
    assert_eq!(r.init_id, init_id);

    // Nil positions are skipped, not dereferenced.
    let sparse = SequentialResolver::new(vec![
        None,
        Some(node.cache.clone() as Arc<dyn Resolver>),
        None,
    ]);
    let mut r = Ref::from_human("alice", "world_bank");
    sparse.resolve_ref(&mut r).await.unwrap();
    assert_eq!(r.init_id, init_id);

    let mut missing = Ref::from_human("alice", "unknown");
    let err = resolver.resolve_ref(&mut missing).await.unwrap_err();
    assert!(matches!(err, ResolveError::NotFound));
}

/// Syncing over the logsync host ops keeps the receiving node's cache
/// current via republished events.
#[tokio::test]
async fn scenario_logsync_feeds_remote_cache() {
    let alice = open_node(1, "alice");
    let init_id = alice
        .book
        .write_dataset_init("alice", "world_bank")
        .await
        .unwrap();
    alice
        .book
        .write_commit(&Ref::from_init_id(&init_id), sample_commit("/mem/QmP1"))
        .await
        .unwrap();

    let bob = open_node(2, "bob");
    let alice_sync = Logsync::new(alice.book.clone());
    let bob_sync = Logsync::new(bob.book.clone());

    let body = alice_sync
        .get(
            &alice_sync.author().await,
            &Ref::from_human("alice", "world_bank"),
        )
        .await
        .unwrap();
    bob_sync
        .put(&alice_sync.author().await, &body)
        .await
        .unwrap();

    // Bob's dscache caught up through the republished events.
    let mut cached = Ref::from_human("alice", "world_bank");
    bob.cache.resolve(&mut cached).unwrap();
    assert_eq!(cached.init_id, init_id);
    assert_eq!(cached.path, "/mem/QmP1");
}

/// A cache rebuilt by full scan matches one maintained by events.
#[tokio::test]
async fn scenario_cache_rebuild_matches_event_replay() {
    let node = open_node(1, "alice");
    let a = node.book.write_dataset_init("alice", "ds_a").await.unwrap();
    node.book
        .write_commit(&Ref::from_init_id(&a), sample_commit("/mem/QmA1"))
        .await
        .unwrap();
    node.book.write_dataset_init("alice", "ds_b").await.unwrap();

    let project = |infos: Vec<VersionInfo>| -> Vec<_> {
        infos
            .into_iter()
            .map(|vi| (vi.init_id, vi.name, vi.path, vi.commit_count, vi.body_rows))
            .collect::<Vec<_>>()
    };

    let by_events = project(node.cache.list_refs().unwrap());
    node.rebuild_cache().await.unwrap();
    let by_scan = project(node.cache.list_refs().unwrap());

    assert_eq!(by_events, by_scan);
}

/// On-disk state survives a full restart.
#[tokio::test]
async fn scenario_restart_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let keypair = Keypair::from_seed(&[5; 32]);

    let init_id = {
        let node = Node::open(
            keypair.clone(),
            "alice",
            NodeOptions {
                dir: Some(dir.path().to_path_buf()),
                cache_create_enabled: true,
                nonce_seed: Some(5),
                clock: Some(Arc::new(|| FIXED_NOW)),
            },
        )
        .unwrap();
        let id = node
            .book
            .write_dataset_init("alice", "world_bank")
            .await
            .unwrap();
        node.book
            .write_commit(&Ref::from_init_id(&id), sample_commit("/mem/QmP1"))
            .await
            .unwrap();
        id
    };

    let node = Node::open(
        keypair,
        "alice",
        NodeOptions {
            dir: Some(dir.path().to_path_buf()),
            cache_create_enabled: true,
            nonce_seed: Some(5),
            clock: Some(Arc::new(|| FIXED_NOW)),
        },
    )
    .unwrap();

    // Both the logbook and the cache come back from their files.
    let mut r = Ref::from_human("alice", "world_bank");
    node.book.resolve(&mut r).await.unwrap();
    assert_eq!(r.init_id, init_id);

    let mut cached = Ref::from_human("alice", "world_bank");
    node.cache.resolve(&mut cached).unwrap();
    assert_eq!(cached.path, "/mem/QmP1");
}
