//! Typed event topics and the pub/sub bus.
//!
//! The logbook publishes an event after every durable write; the dscache
//! (and anything else that keeps a derived view) subscribes. Fan-out is
//! synchronous and best-effort: handlers run in registration order on the
//! publisher's task, handler errors are logged and never abort delivery.
//! Subscribers that need to do heavy work must enqueue internally.
//!
//! Delivery is at-least-once from the subscriber's point of view, so
//! handlers must be idempotent on `(init_id, commit_count)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::dsref::VersionInfo;

/// The topics a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A dataset was initialized and named.
    DatasetNameInit,
    /// A commit advanced a dataset's head.
    LogbookWriteCommit,
    /// A dataset and its history were deleted.
    DatasetDeleteAll,
    /// A dataset's pretty name changed.
    DatasetRename,
    /// A working directory was linked to a dataset.
    DatasetCreateLink,
}

/// A published event with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Payload: the minimal info of the freshly initialized dataset.
    DatasetNameInit(VersionInfo),
    /// Payload: the dataset's info after the commit, including the new
    /// head path and commit count.
    LogbookWriteCommit(VersionInfo),
    DatasetDeleteAll {
        init_id: String,
    },
    DatasetRename {
        init_id: String,
        old_name: String,
        new_name: String,
    },
    DatasetCreateLink {
        init_id: String,
        fsi_path: String,
    },
}

impl Event {
    /// The topic this event belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            Event::DatasetNameInit(_) => EventType::DatasetNameInit,
            Event::LogbookWriteCommit(_) => EventType::LogbookWriteCommit,
            Event::DatasetDeleteAll { .. } => EventType::DatasetDeleteAll,
            Event::DatasetRename { .. } => EventType::DatasetRename,
            Event::DatasetCreateLink { .. } => EventType::DatasetCreateLink,
        }
    }
}

/// Result type for event handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// The pub/sub contract.
pub trait Bus: Send + Sync {
    /// Deliver an event to every handler subscribed to its topic, in
    /// registration order.
    fn publish(&self, event: &Event);

    /// Register a handler for the listed topics.
    fn subscribe_types(&self, types: &[EventType], handler: Handler);
}

struct Subscription {
    types: Vec<EventType>,
    handler: Handler,
}

/// In-process bus with synchronous fan-out.
#[derive(Default)]
pub struct MemBus {
    subs: RwLock<Vec<Subscription>>,
}

impl MemBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered subscriptions.
    pub fn num_subscribers(&self) -> usize {
        self.subs.read().expect("bus lock poisoned").len()
    }
}

impl fmt::Debug for MemBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemBus({} subscribers)", self.num_subscribers())
    }
}

impl Bus for MemBus {
    fn publish(&self, event: &Event) {
        let event_type = event.event_type();
        let subs = self.subs.read().expect("bus lock poisoned");
        for sub in subs.iter() {
            if !sub.types.contains(&event_type) {
                continue;
            }
            if let Err(e) = (sub.handler)(event) {
                tracing::warn!(?event_type, error = %e, "event handler failed");
            }
        }
    }

    fn subscribe_types(&self, types: &[EventType], handler: Handler) {
        let mut subs = self.subs.write().expect("bus lock poisoned");
        subs.push(Subscription {
            types: types.to_vec(),
            handler,
        });
    }
}

/// A no-op bus for tests and optional wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct NilBus;

impl Bus for NilBus {
    fn publish(&self, _event: &Event) {}

    fn subscribe_types(&self, _types: &[EventType], _handler: Handler) {}
}
