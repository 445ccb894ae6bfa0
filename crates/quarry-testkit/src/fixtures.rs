//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: deterministic keypairs,
//! fixed clocks, in-memory logbooks, and a bus that records what it
//! delivered.

use std::sync::{Arc, Mutex};

use quarry_core::crypto::Keypair;
use quarry_core::dsref::Ref;
use quarry_core::event::{Bus, Event, EventType, MemBus};
use quarry_logbook::{Logbook, LogbookOptions};
use quarry_oplog::CommitPayload;

/// The fixed instant every fixture clock reports.
pub const FIXED_NOW: i64 = 1_700_000_000_000;

/// A deterministic logbook plus a recording bus.
pub struct TestFixture {
    pub keypair: Keypair,
    pub bus: Arc<MemBus>,
    pub book: Arc<Logbook>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl TestFixture {
    /// Create a fixture with a seed-derived keypair and an in-memory
    /// logbook.
    pub fn new(seed: u8, username: &str) -> Self {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let bus = Arc::new(MemBus::new());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_types(
            &[
                EventType::DatasetNameInit,
                EventType::LogbookWriteCommit,
                EventType::DatasetDeleteAll,
                EventType::DatasetRename,
                EventType::DatasetCreateLink,
            ],
            Arc::new(move |e| {
                sink.lock().expect("event sink poisoned").push(e.clone());
                Ok(())
            }),
        );

        let book = Arc::new(
            Logbook::open(
                keypair.clone(),
                username,
                bus.clone(),
                LogbookOptions {
                    nonce_seed: Some(seed as u64),
                    clock: Some(Arc::new(|| FIXED_NOW)),
                    ..Default::default()
                },
            )
            .expect("open in-memory logbook"),
        );

        Self {
            keypair,
            bus,
            book,
            events,
        }
    }

    /// Everything the bus delivered so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    /// Initialize a dataset and commit one version, returning the
    /// InitID.
    pub async fn seed_dataset(&self, name: &str, path: &str) -> String {
        let init_id = self
            .book
            .write_dataset_init(self.book.username(), name)
            .await
            .expect("init dataset");
        self.book
            .write_commit(&Ref::from_init_id(&init_id), sample_commit(path))
            .await
            .expect("commit dataset");
        init_id
    }
}

/// A plausible commit payload for tests.
pub fn sample_commit(path: &str) -> CommitPayload {
    CommitPayload {
        path: path.to_string(),
        title: "initial import".to_string(),
        body_size: 17,
        body_rows: 2,
        body_format: "csv".to_string(),
        ..Default::default()
    }
}

/// Fixtures for multi-party tests, each with a distinct seed and name.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| TestFixture::new(i as u8 + 1, &format!("user_{i}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_records_events() {
        let fixture = TestFixture::new(1, "alice");
        fixture.seed_dataset("world_bank", "/mem/QmP1").await;

        let events = fixture.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::DatasetNameInit(_)));
        assert!(matches!(events[1], Event::LogbookWriteCommit(_)));
    }

    #[test]
    fn test_multi_party_distinct_identities() {
        let fixtures = multi_party_fixtures(3);
        let ids: Vec<_> = fixtures
            .iter()
            .map(|f| f.book.profile_id().to_string())
            .collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }
}
