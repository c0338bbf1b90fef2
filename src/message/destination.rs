//! Queue destination
//!
//! Connects transactional operations to the in-memory queues:
//! - a committed enqueue delivers the message to the queue
//! - a committed acknowledge drops the delivered entry
//! - a rolled-back acknowledge puts the entry back at the head
//! - a committed dequeue by id withdraws any entry still queued for it

use std::sync::Arc;

use super::queue::{Queue, QueueEntry};
use super::record::{EnqueueRecord, Message, MessageId};
use super::reference::ReferenceCounter;
use crate::txn::TransactionAction;

/// Delivery side of one queue.
#[derive(Clone)]
pub struct QueueDestination {
    queue: Arc<Queue>,
    references: ReferenceCounter,
}

impl QueueDestination {
    pub(crate) fn new(queue: Arc<Queue>, references: ReferenceCounter) -> Self {
        Self { queue, references }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Wrap the action of a staged enqueue: on commit the entry becomes
    /// deliverable, holding its own reference to the message, before the
    /// inner action runs.
    pub(crate) fn delivery(
        &self,
        message: Message,
        inner: Box<dyn TransactionAction>,
    ) -> Box<dyn TransactionAction> {
        Box::new(Delivery {
            queue: Arc::clone(&self.queue),
            references: self.references.clone(),
            message,
            inner,
        })
    }

    /// Action for a staged acknowledge of a taken entry.
    pub(crate) fn acknowledgement(&self, entry: QueueEntry) -> Box<dyn TransactionAction> {
        Box::new(Acknowledgement {
            queue: Arc::clone(&self.queue),
            entry,
        })
    }

    /// Wrap the action of a dequeue staged by message id.
    pub(crate) fn withdrawal(
        &self,
        message_id: MessageId,
        inner: Box<dyn TransactionAction>,
    ) -> Box<dyn TransactionAction> {
        Box::new(Withdrawal {
            queue: Arc::clone(&self.queue),
            message_id,
            inner,
        })
    }
}

struct Delivery {
    queue: Arc<Queue>,
    references: ReferenceCounter,
    message: Message,
    inner: Box<dyn TransactionAction>,
}

impl TransactionAction for Delivery {
    fn post_commit(self: Box<Self>, records: &[EnqueueRecord]) {
        let Delivery {
            queue,
            references,
            message,
            inner,
        } = *self;
        if let Some(record) = records.first() {
            let reference = references.acquire(message.id());
            queue.push(QueueEntry::new(record.clone(), message, reference));
        }
        inner.post_commit(records);
    }

    fn on_rollback(self: Box<Self>) {
        self.inner.on_rollback();
    }
}

struct Acknowledgement {
    queue: Arc<Queue>,
    entry: QueueEntry,
}

impl TransactionAction for Acknowledgement {
    fn post_commit(self: Box<Self>, _records: &[EnqueueRecord]) {}

    fn on_rollback(self: Box<Self>) {
        self.queue.requeue(self.entry);
    }
}

struct Withdrawal {
    queue: Arc<Queue>,
    message_id: MessageId,
    inner: Box<dyn TransactionAction>,
}

impl TransactionAction for Withdrawal {
    fn post_commit(self: Box<Self>, records: &[EnqueueRecord]) {
        drop(self.queue.remove(self.message_id));
        self.inner.post_commit(records);
    }

    fn on_rollback(self: Box<Self>) {
        self.inner.on_rollback();
    }
}

impl std::fmt::Debug for QueueDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDestination")
            .field("queue", &self.queue.name())
            .finish()
    }
}
