//! Message store facade
//!
//! The handle protocol layers use: transactions, queues, messages and
//! references, over one record store and one replication group.
//!
//! A node that becomes master after applying batches shipped by another
//! master rebuilds its in-memory state before its first commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::failure::{Failure, FailureResult};
use crate::message::{
    message_key, validate_queue_name, Message, MessageId, MessageRecord, MessageReference, Queue,
    QueueDestination, QueueEntry, ReferenceCounter,
};
use crate::observability::{
    Event, ListenerSet, LoggingListener, MetricsRegistry, StoreEvent, StoreEventListener,
};
use crate::replication::{NodeRole, ReplicationGroup, RoleSnapshot};
use crate::storage::RecordStore;
use crate::txn::{
    CommitReceipt, NoAction, Transaction, TransactionAction, TransactionCoordinator,
};

use super::ids::IdAllocator;
use super::recovery::{recover, RecoveryReport};

/// Group state the in-memory state was last built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Activation {
    epoch: u64,
    applied: u64,
}

pub struct MessageStore {
    records: Arc<dyn RecordStore>,
    group: Arc<ReplicationGroup>,
    coordinator: TransactionCoordinator,
    references: ReferenceCounter,
    metrics: Arc<MetricsRegistry>,
    queues: RwLock<BTreeMap<String, Arc<Queue>>>,
    ids: IdAllocator,
    listeners: ListenerSet,
    activation: Mutex<Activation>,
    last_recovery: Mutex<RecoveryReport>,
    closed: AtomicBool,
}

impl MessageStore {
    /// Open the store over `records`, rebuilding queues and reference
    /// counts and deleting orphaned messages.
    pub fn open(
        records: Arc<dyn RecordStore>,
        group: Arc<ReplicationGroup>,
        metrics: Arc<MetricsRegistry>,
    ) -> FailureResult<Arc<Self>> {
        let references = ReferenceCounter::with_metrics(Arc::clone(&metrics));
        let coordinator = TransactionCoordinator::new(
            Arc::clone(&records),
            Arc::clone(&group),
            references.clone(),
            Arc::clone(&metrics),
        );
        let activation = Activation {
            epoch: group.epoch(),
            applied: group.applied_batches(),
        };

        let store = Self {
            records,
            group,
            coordinator,
            references,
            metrics,
            queues: RwLock::new(BTreeMap::new()),
            ids: IdAllocator::default(),
            listeners: ListenerSet::default(),
            activation: Mutex::new(activation),
            last_recovery: Mutex::new(RecoveryReport::default()),
            closed: AtomicBool::new(false),
        };
        store.listeners.add(Arc::new(LoggingListener));

        let report = store.rebuild()?;
        tracing::info!(
            event = %Event::StoreOpened,
            node = %store.group.local_name(),
            queues = report.queues,
            messages = report.messages,
            "message store opened"
        );
        store.listeners.emit(StoreEvent::Opened {
            queues: report.queues,
            messages: report.messages,
        });
        Ok(Arc::new(store))
    }

    fn rebuild(&self) -> FailureResult<RecoveryReport> {
        let report = recover(self)?;
        self.ids.resume(self.records.as_ref(), report.next_id)?;
        *self
            .last_recovery
            .lock()
            .map_err(|_| Failure::poisoned("recovery report"))? = report.clone();
        Ok(report)
    }

    /// What the most recent rebuild found.
    pub fn last_recovery(&self) -> FailureResult<RecoveryReport> {
        self.last_recovery
            .lock()
            .map(|report| report.clone())
            .map_err(|_| Failure::poisoned("recovery report"))
    }

    /// Join the replication group and start reporting role changes to
    /// listeners.
    pub async fn start(self: &Arc<Self>) -> FailureResult<RoleSnapshot> {
        let mut roles = self.group.subscribe();
        let snapshot = self.group.start().await?;

        let store = Arc::downgrade(self);
        let mut last = RoleSnapshot {
            role: NodeRole::Unknown,
            epoch: u64::MAX,
        };
        tokio::spawn(async move {
            loop {
                let current = *roles.borrow_and_update();
                if current != last {
                    let Some(store) = store.upgrade() else { break };
                    store.listeners.emit(StoreEvent::RoleChanged {
                        role: current.role,
                        epoch: current.epoch,
                    });
                    last = current;
                }
                if roles.changed().await.is_err() {
                    break;
                }
            }
        });
        Ok(snapshot)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn group(&self) -> &Arc<ReplicationGroup> {
        &self.group
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn references(&self) -> &ReferenceCounter {
        &self.references
    }

    pub(crate) fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub(crate) fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn add_listener(&self, listener: Arc<dyn StoreEventListener>) {
        self.listeners.add(listener);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> FailureResult<()> {
        if self.is_closed() {
            return Err(Failure::validation("message store is closed"));
        }
        Ok(())
    }

    // =========================================================================
    // Queues
    // =========================================================================

    /// The queue named `name`, created empty on first use.
    pub fn queue(&self, name: &str) -> FailureResult<Arc<Queue>> {
        validate_queue_name(name)?;
        if let Some(queue) = self
            .queues
            .read()
            .map_err(|_| Failure::poisoned("queue table"))?
            .get(name)
        {
            return Ok(Arc::clone(queue));
        }
        let mut queues = self
            .queues
            .write()
            .map_err(|_| Failure::poisoned("queue table"))?;
        Ok(Arc::clone(
            queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Queue::new(name))),
        ))
    }

    /// Every known queue, ordered by name.
    pub fn queues(&self) -> FailureResult<Vec<Arc<Queue>>> {
        Ok(self
            .queues
            .read()
            .map_err(|_| Failure::poisoned("queue table"))?
            .values()
            .cloned()
            .collect())
    }

    pub fn destination(&self, queue: &str) -> FailureResult<QueueDestination> {
        Ok(QueueDestination::new(self.queue(queue)?, self.references.clone()))
    }

    /// Whether (`queue`, `message_id`) is durably enqueued.
    pub fn is_enqueued(&self, queue: &str, message_id: MessageId) -> FailureResult<bool> {
        self.coordinator.is_enqueued(queue, message_id)
    }

    /// Durable enqueue records of `queue`, in enqueue order.
    pub fn enqueued(&self, queue: &str) -> FailureResult<Vec<crate::message::EnqueueRecord>> {
        self.coordinator.enqueued(queue)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// A new, not yet persisted message. It is written by the first
    /// committed enqueue.
    pub fn create_message(&self, body: impl Into<Vec<u8>>) -> FailureResult<Message> {
        self.check_open()?;
        let id = self.ids.allocate(self.records.as_ref())?;
        self.metrics.increment_messages_created();
        Ok(Message::new(id, body.into()))
    }

    /// A persisted message read back from the record store.
    pub fn get_message(&self, id: MessageId) -> FailureResult<Option<Message>> {
        self.records
            .get(&message_key(id))?
            .map(|bytes| MessageRecord::decode(&bytes).map(Message::from_record))
            .transpose()
    }

    /// Take a reference that keeps `message` alive until released.
    pub fn acquire_reference(&self, message: &Message) -> MessageReference {
        self.references.acquire(message.id())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn begin_transaction(&self) -> Transaction {
        self.coordinator.begin()
    }

    /// Stage an enqueue. Once committed the message is delivered to the
    /// in-memory queue before `action` runs.
    pub fn enqueue(
        &self,
        txn: &mut Transaction,
        queue: &str,
        message: &Message,
        action: impl TransactionAction + 'static,
    ) -> FailureResult<()> {
        let destination = self.destination(queue)?;
        self.coordinator.stage_enqueue(
            txn,
            queue,
            message,
            Some(destination.delivery(message.clone(), Box::new(action))),
        )
    }

    pub fn dequeue(
        &self,
        txn: &mut Transaction,
        queue: &str,
        message_id: MessageId,
        action: impl TransactionAction + 'static,
    ) -> FailureResult<()> {
        let destination = self.destination(queue)?;
        self.coordinator.stage_dequeue(
            txn,
            queue,
            message_id,
            Some(destination.withdrawal(message_id, Box::new(action))),
        )
    }

    /// Stage an enqueue with no caller action.
    pub fn send(&self, txn: &mut Transaction, queue: &str, message: &Message) -> FailureResult<()> {
        self.enqueue(txn, queue, message, NoAction)
    }

    /// Take the next deliverable entry of `queue`.
    pub fn receive(&self, queue: &str) -> FailureResult<Option<QueueEntry>> {
        self.check_open()?;
        self.ensure_active()?;
        Ok(self.queue(queue)?.take())
    }

    /// Stage the dequeue of a received entry. A rolled-back acknowledge
    /// returns the entry to the head of its queue.
    pub fn acknowledge(&self, txn: &mut Transaction, entry: QueueEntry) -> FailureResult<()> {
        let queue_name = entry.record().queue.clone();
        let message_id = entry.record().message_id;
        let destination = self.destination(&queue_name)?;
        if txn.state() != crate::txn::TransactionState::Open {
            let state = txn.state();
            destination.queue().requeue(entry);
            return Err(Failure::validation(format!(
                "cannot acknowledge on transaction {} in state {}",
                txn.id(),
                state
            )));
        }
        self.coordinator.stage_dequeue(
            txn,
            &queue_name,
            message_id,
            Some(destination.acknowledgement(entry)),
        )
    }

    /// Rebuild in-memory state if this node became master after applying
    /// batches from another master.
    fn ensure_active(&self) -> FailureResult<()> {
        let snapshot = self.group.snapshot();
        if snapshot.role != NodeRole::Master {
            return Ok(());
        }
        let mut activation = self
            .activation
            .lock()
            .map_err(|_| Failure::poisoned("store activation"))?;
        let current = Activation {
            epoch: snapshot.epoch,
            applied: self.group.applied_batches(),
        };
        if *activation == current {
            return Ok(());
        }
        if activation.applied != current.applied {
            self.rebuild()?;
        }
        *activation = current;
        drop(activation);

        self.listeners.emit(StoreEvent::Activated {
            epoch: snapshot.epoch,
        });
        Ok(())
    }

    /// Commit `txn`. The commit runs to completion on its own task, so
    /// abandoning the returned future does not abandon the commit.
    pub async fn commit(self: &Arc<Self>, txn: Transaction) -> FailureResult<CommitReceipt> {
        let transaction_id = txn.id();
        let (enqueues, dequeues) = txn.op_counts();
        let staged = txn.len();

        if let Err(failure) = self.check_open().and_then(|()| self.ensure_active()) {
            self.coordinator.rollback(txn)?;
            self.after_outcome(StoreEvent::RolledBack {
                transaction_id,
                actions: staged,
            });
            return Err(failure);
        }

        let store = Arc::clone(self);
        let task = tokio::spawn(async move { store.coordinator.commit(txn).await });
        let result = match task.await {
            Ok(result) => result,
            Err(join) => Err(Failure::server_scoped(format!(
                "commit task for transaction {} did not complete: {}",
                transaction_id, join
            ))),
        };

        match &result {
            Ok(_) => self.after_outcome(StoreEvent::Committed {
                transaction_id,
                enqueues,
                dequeues,
            }),
            Err(failure) => {
                if failure.is_fatal() {
                    self.listeners.emit(StoreEvent::Fatal {
                        message: failure.to_string(),
                    });
                }
                self.after_outcome(StoreEvent::RolledBack {
                    transaction_id,
                    actions: staged,
                });
            }
        }
        result
    }

    /// Roll back an open transaction.
    pub fn rollback(&self, txn: Transaction) -> FailureResult<()> {
        let transaction_id = txn.id();
        let actions = txn.len();
        self.coordinator.rollback(txn)?;
        self.after_outcome(StoreEvent::RolledBack {
            transaction_id,
            actions,
        });
        Ok(())
    }

    fn after_outcome(&self, event: StoreEvent) {
        self.listeners.emit(event);
        if let Err(failure) = self.reap() {
            tracing::error!(
                event = %Event::ServerScopedFailure,
                error = %failure,
                "failed to delete unreferenced messages"
            );
            self.listeners.emit(StoreEvent::Fatal {
                message: failure.to_string(),
            });
        }
    }

    /// Delete message records nothing references any more.
    pub fn reap(&self) -> FailureResult<Vec<MessageId>> {
        let deleted = self.coordinator.reap()?;
        if !deleted.is_empty() {
            self.listeners.emit(StoreEvent::MessagesDeleted {
                ids: deleted.clone(),
            });
        }
        Ok(deleted)
    }

    /// Stop accepting work. Committed state is already durable.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(event = %Event::StoreClosed, node = %self.group.local_name(), "message store closed");
        self.listeners.emit(StoreEvent::Closed);
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("group", &self.group)
            .field("closed", &self.is_closed())
            .finish()
    }
}
