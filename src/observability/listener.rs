//! Store event listeners
//!
//! The store reports what it did to every registered listener after the
//! fact. Listeners observe; they cannot veto or change an outcome, and a
//! panicking listener is contained.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use crate::message::MessageId;
use crate::replication::NodeRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Opened {
        queues: usize,
        messages: usize,
    },
    /// The local node's role or epoch changed.
    RoleChanged {
        role: NodeRole,
        epoch: u64,
    },
    /// The store (re)built its in-memory state to serve as master.
    Activated {
        epoch: u64,
    },
    Committed {
        transaction_id: Uuid,
        enqueues: usize,
        dequeues: usize,
    },
    RolledBack {
        transaction_id: Uuid,
        actions: usize,
    },
    MessagesDeleted {
        ids: Vec<MessageId>,
    },
    /// A server-scoped failure surfaced; the node should stop serving.
    Fatal {
        message: String,
    },
    Closed,
}

pub trait StoreEventListener: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

/// Emits every event as a debug-level log line.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl StoreEventListener for LoggingListener {
    fn on_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Fatal { message } => tracing::error!(%message, "store event: fatal"),
            other => tracing::debug!(event = ?other, "store event"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<StoreEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl StoreEventListener for RecordingListener {
    fn on_event(&self, event: &StoreEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fan-out to registered listeners.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn StoreEventListener>>>,
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn StoreEventListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn emit(&self, event: StoreEvent) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
                tracing::warn!(event = ?event, "store event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl StoreEventListener for Panicking {
        fn on_event(&self, _event: &StoreEvent) {
            panic!("listener bug");
        }
    }

    #[test]
    fn test_panicking_listener_does_not_starve_others() {
        let set = ListenerSet::default();
        let recorder = Arc::new(RecordingListener::new());
        set.add(Arc::new(Panicking));
        set.add(recorder.clone());

        set.emit(StoreEvent::Closed);
        assert_eq!(recorder.events(), vec![StoreEvent::Closed]);
    }
}
