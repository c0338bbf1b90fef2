//! In-memory queues
//!
//! A queue holds committed, deliverable entries. Each entry owns a
//! reference to its message for as long as it sits in the queue or is
//! held by a consumer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use super::record::{EnqueueRecord, Message, MessageId};
use super::reference::MessageReference;

/// A deliverable message on a queue.
pub struct QueueEntry {
    record: EnqueueRecord,
    message: Message,
    _reference: MessageReference,
}

impl QueueEntry {
    pub(crate) fn new(record: EnqueueRecord, message: Message, reference: MessageReference) -> Self {
        Self {
            record,
            message,
            _reference: reference,
        }
    }

    pub fn record(&self) -> &EnqueueRecord {
        &self.record
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("queue", &self.record.queue)
            .field("message_id", &self.record.message_id)
            .finish()
    }
}

/// FIFO of committed entries for one queue.
pub struct Queue {
    name: String,
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        // Entries are only pushed and popped whole; a poisoned deque is intact.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn push(&self, entry: QueueEntry) {
        self.lock().push_back(entry);
    }

    /// Put a taken entry back at the head, keeping delivery order.
    pub(crate) fn requeue(&self, entry: QueueEntry) {
        self.lock().push_front(entry);
    }

    /// Take the next entry for delivery.
    pub fn take(&self) -> Option<QueueEntry> {
        self.lock().pop_front()
    }

    /// Take the entry for `message_id` wherever it sits.
    pub(crate) fn remove(&self, message_id: MessageId) -> Option<QueueEntry> {
        let mut entries = self.lock();
        let index = entries
            .iter()
            .position(|e| e.record.message_id == message_id)?;
        entries.remove(index)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Message ids currently queued, head first.
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.lock().iter().map(|e| e.record.message_id).collect()
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("depth", &self.len())
            .finish()
    }
}
