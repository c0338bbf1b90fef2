//! Transaction coordinator
//!
//! Turns a [`Transaction`] into one durable batch.
//!
//! # Commit
//!
//! 1. Admission: only the master commits; the admission is held until the
//!    outcome is known so a stepping-down master drains first
//! 2. Per-queue locks, taken in name order
//! 3. Validation and local write of one batch
//! 4. Quorum wait; on failure a compensating batch reverts the enqueue
//!    records and the transaction rolls back
//! 5. In-memory index update, then post-commit callbacks in staging order
//!
//! In-memory state changes only after steps 3 and 4 both succeed. Messages
//! left without references are deleted by [`TransactionCoordinator::reap`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::action::TransactionAction;
use super::transaction::{PlannedOp, StagedOp, Transaction};
use crate::failure::{Failure, FailureResult};
use crate::message::{
    message_key, EnqueueRecord, Message, MessageId, MessageReference, ReferenceCounter,
    MESSAGE_PREFIX,
};
use crate::observability::{Event, MetricsRegistry};
use crate::replication::{ReplicationGroup, WriteAdmission};
use crate::storage::{CommittedBatch, RecordStore, RecordTransaction, WriteBatch, WriteOp};

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub transaction_id: Uuid,
    /// Local batch sequence; `None` for an empty transaction.
    pub sequence: Option<u64>,
    /// Epoch the batch was written under.
    pub epoch: Option<u64>,
    /// One record per staged operation, in staging order.
    pub records: Vec<EnqueueRecord>,
}

/// A batch that reached its durability level. Holds the admission and
/// queue locks until dropped.
struct Written {
    sequence: u64,
    epoch: u64,
    records: Vec<EnqueueRecord>,
    _queues: Vec<OwnedMutexGuard<()>>,
    _admission: WriteAdmission,
}

struct DurableEntry {
    record: EnqueueRecord,
    _reference: MessageReference,
}

pub struct TransactionCoordinator {
    records: Arc<dyn RecordStore>,
    group: Arc<ReplicationGroup>,
    references: ReferenceCounter,
    metrics: Arc<MetricsRegistry>,
    durable: Mutex<HashMap<(String, MessageId), DurableEntry>>,
    queue_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Serializes local batch writes against message deletion.
    write_lock: Mutex<()>,
    pending_deletes: Mutex<BTreeSet<MessageId>>,
    next_position: AtomicU64,
}

impl TransactionCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        group: Arc<ReplicationGroup>,
        references: ReferenceCounter,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            records,
            group,
            references,
            metrics,
            durable: Mutex::new(HashMap::new()),
            queue_locks: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
            pending_deletes: Mutex::new(BTreeSet::new()),
            next_position: AtomicU64::new(0),
        }
    }

    fn durable(&self) -> FailureResult<MutexGuard<'_, HashMap<(String, MessageId), DurableEntry>>> {
        self.durable
            .lock()
            .map_err(|_| Failure::poisoned("durable enqueue index"))
    }

    fn write_guard(&self) -> FailureResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Failure::poisoned("store write"))
    }

    pub fn begin(&self) -> Transaction {
        self.metrics.increment_begun();
        Transaction::new(Arc::clone(&self.metrics))
    }

    /// Stage `message` onto `queue`. The transaction holds a reference to
    /// the message until its outcome is known.
    pub fn stage_enqueue(
        &self,
        txn: &mut Transaction,
        queue: &str,
        message: &Message,
        action: Option<Box<dyn TransactionAction>>,
    ) -> FailureResult<()> {
        crate::message::validate_queue_name(queue)?;
        txn.stage(
            StagedOp::Enqueue {
                queue: queue.to_string(),
                message: message.clone(),
                reference: self.references.acquire(message.id()),
            },
            action,
        )
    }

    /// Stage removal of the enqueue record for (`queue`, `message_id`).
    pub fn stage_dequeue(
        &self,
        txn: &mut Transaction,
        queue: &str,
        message_id: MessageId,
        action: Option<Box<dyn TransactionAction>>,
    ) -> FailureResult<()> {
        crate::message::validate_queue_name(queue)?;
        txn.stage(
            StagedOp::Dequeue {
                queue: queue.to_string(),
                message_id,
            },
            action,
        )
    }

    // =========================================================================
    // Commit / rollback
    // =========================================================================

    pub async fn commit(&self, mut txn: Transaction) -> FailureResult<CommitReceipt> {
        txn.begin_commit()?;
        let plan = txn.plan();

        if plan.is_empty() {
            let panics = txn.complete_commit(&[])?;
            self.metrics.add_callback_panics(panics);
            self.metrics.increment_committed();
            return Ok(CommitReceipt {
                transaction_id: txn.id(),
                sequence: None,
                epoch: None,
                records: Vec::new(),
            });
        }

        match self.write(&plan).await {
            Ok(written) => {
                // Queue locks stay held through the callbacks so deliveries
                // reach each queue in commit order.
                let panics = txn.complete_commit(&written.records)?;
                let Written {
                    sequence,
                    epoch,
                    records,
                    _queues,
                    _admission,
                } = written;
                drop((_queues, _admission));
                self.metrics.add_callback_panics(panics);
                self.metrics.increment_committed();
                tracing::debug!(
                    event = %Event::TransactionCommitted,
                    transaction = %txn.id(),
                    sequence,
                    operations = records.len(),
                    "transaction committed"
                );
                Ok(CommitReceipt {
                    transaction_id: txn.id(),
                    sequence: Some(sequence),
                    epoch: Some(epoch),
                    records,
                })
            }
            Err(failure) => {
                let panics = txn.roll_back()?;
                self.metrics.add_callback_panics(panics);
                self.metrics.increment_rolled_back();
                if failure.scope().is_some() {
                    self.metrics.increment_commit_failure(failure.is_fatal());
                }
                if failure.is_fatal() {
                    tracing::error!(
                        event = %Event::ServerScopedFailure,
                        transaction = %txn.id(),
                        error = %failure,
                        "commit failed"
                    );
                } else {
                    tracing::warn!(
                        event = %Event::CommitRejected,
                        transaction = %txn.id(),
                        error = %failure,
                        "commit failed, transaction rolled back"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Discard an open transaction, running its rollback callbacks.
    pub fn rollback(&self, mut txn: Transaction) -> FailureResult<()> {
        let panics = txn.roll_back()?;
        self.metrics.add_callback_panics(panics);
        self.metrics.increment_rolled_back();
        tracing::debug!(
            event = %Event::TransactionRolledBack,
            transaction = %txn.id(),
            operations = txn.len(),
            "transaction rolled back"
        );
        Ok(())
    }

    async fn lock_queues(&self, plan: &[PlannedOp]) -> FailureResult<Vec<OwnedMutexGuard<()>>> {
        let names: BTreeSet<&str> = plan.iter().map(PlannedOp::queue).collect();
        let locks: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self
                .queue_locks
                .lock()
                .map_err(|_| Failure::poisoned("queue lock table"))?;
            names
                .into_iter()
                .map(|name| Arc::clone(map.entry(name.to_string()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        Ok(guards)
    }

    async fn write(&self, plan: &[PlannedOp]) -> FailureResult<Written> {
        let admission = self.group.admit_write().await?;
        let _queues = self.lock_queues(plan).await?;

        let (committed, records) = self.write_local(plan)?;

        if let Err(failure) = self
            .group
            .replicate(&admission, committed.sequence, &committed.batch)
            .await
        {
            return Err(self.compensate(&admission, committed, failure).await);
        }

        self.apply(plan, &records)?;
        Ok(Written {
            sequence: committed.sequence,
            epoch: admission.epoch(),
            records,
            _queues,
            _admission: admission,
        })
    }

    /// Validate the plan against the durable index and write it as one batch.
    fn write_local(&self, plan: &[PlannedOp]) -> FailureResult<(CommittedBatch, Vec<EnqueueRecord>)> {
        let _write = self.write_guard()?;
        let durable = self.durable()?;
        let mut rtx = RecordTransaction::begin(self.records.as_ref());
        let mut records = Vec::with_capacity(plan.len());
        let mut touched: HashSet<(String, MessageId)> = HashSet::new();

        for op in plan {
            match op {
                PlannedOp::Enqueue { queue, message } => {
                    let key = (queue.clone(), message.id());
                    if durable.contains_key(&key) || !touched.insert(key) {
                        return Err(Failure::validation(format!(
                            "message {} is already enqueued on '{}'",
                            message.id(),
                            queue
                        )));
                    }
                    let body_key = message_key(message.id());
                    if rtx.get(&body_key)?.is_none() {
                        rtx.put(&body_key, message.to_record().encode()?)?;
                    }
                    let record = EnqueueRecord {
                        queue: queue.clone(),
                        message_id: message.id(),
                        position: self.next_position.fetch_add(1, Ordering::Relaxed),
                    };
                    rtx.put(&record.key(), record.encode()?)?;
                    records.push(record);
                }
                PlannedOp::Dequeue { queue, message_id } => {
                    let key = (queue.clone(), *message_id);
                    let Some(entry) = durable.get(&key) else {
                        return Err(Failure::validation(format!(
                            "message {} is not enqueued on '{}'",
                            message_id, queue
                        )));
                    };
                    if !touched.insert(key) {
                        return Err(Failure::validation(format!(
                            "message {} is dequeued from '{}' twice in one transaction",
                            message_id, queue
                        )));
                    }
                    rtx.delete(&entry.record.key())?;
                    records.push(entry.record.clone());
                }
            }
        }

        Ok((rtx.commit()?, records))
    }

    /// Revert the enqueue records of a batch that did not reach quorum.
    ///
    /// Message bodies are left alone; the released references delete them
    /// once nothing else holds them.
    async fn compensate(
        &self,
        admission: &WriteAdmission,
        committed: CommittedBatch,
        failure: Failure,
    ) -> Failure {
        let undo: WriteBatch = committed
            .undo
            .ops()
            .iter()
            .filter(|op| !op.key().starts_with(MESSAGE_PREFIX))
            .cloned()
            .collect::<Vec<WriteOp>>()
            .into();

        let written = self
            .write_guard()
            .and_then(|_write| self.records.write_batch(&undo).map_err(Failure::from));

        match written {
            Ok(undo_sequence) => {
                self.metrics.increment_compensations();
                tracing::warn!(
                    event = %Event::CompensationWritten,
                    sequence = committed.sequence,
                    undo_sequence,
                    error = %failure,
                    "batch reverted after failed quorum wait"
                );
                if let Err(err) = self.group.replicate(admission, undo_sequence, &undo).await {
                    tracing::warn!(error = %err, undo_sequence, "compensating batch not fully replicated");
                }
                failure
            }
            Err(undo_failure) => {
                tracing::error!(
                    event = %Event::ServerScopedFailure,
                    sequence = committed.sequence,
                    error = %undo_failure,
                    "failed to revert batch; local store holds an unacknowledged commit"
                );
                Failure::server_scoped(format!(
                    "batch {} could not be reverted after: {}",
                    committed.sequence, failure
                ))
                .with_source(undo_failure)
            }
        }
    }

    fn apply(&self, plan: &[PlannedOp], records: &[EnqueueRecord]) -> FailureResult<()> {
        let mut durable = self.durable()?;
        let mut enqueues = 0;
        let mut dequeues = 0;
        for (op, record) in plan.iter().zip(records) {
            match op {
                PlannedOp::Enqueue { message, .. } => {
                    message.mark_persisted();
                    durable.insert(
                        (record.queue.clone(), record.message_id),
                        DurableEntry {
                            record: record.clone(),
                            _reference: self.references.acquire(record.message_id),
                        },
                    );
                    enqueues += 1;
                }
                PlannedOp::Dequeue { .. } => {
                    durable.remove(&(record.queue.clone(), record.message_id));
                    dequeues += 1;
                }
            }
        }
        self.metrics.add_enqueues(enqueues);
        self.metrics.add_dequeues(dequeues);
        Ok(())
    }

    // =========================================================================
    // Message deletion
    // =========================================================================

    /// Delete message bodies no longer referenced by anything.
    pub fn reap(&self) -> FailureResult<Vec<MessageId>> {
        let mut candidates = {
            let mut pending = self
                .pending_deletes
                .lock()
                .map_err(|_| Failure::poisoned("pending deletes"))?;
            std::mem::take(&mut *pending)
        };
        candidates.extend(self.references.take_unreferenced());
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let _write = self.write_guard()?;
        let mut batch = WriteBatch::new();
        let mut deleted = Vec::new();
        for id in &candidates {
            if self.references.count(*id) > 0 {
                continue;
            }
            let key = message_key(*id);
            if self.records.get(&key)?.is_some() {
                batch.delete(key);
                deleted.push(*id);
            }
        }
        if batch.is_empty() {
            return Ok(deleted);
        }

        if let Err(err) = self.records.write_batch(&batch) {
            if let Ok(mut pending) = self.pending_deletes.lock() {
                pending.extend(candidates);
            }
            return Err(err.into());
        }

        self.metrics.add_messages_deleted(deleted.len() as u64);
        tracing::debug!(event = %Event::MessagesDeleted, count = deleted.len(), "deleted unreferenced messages");
        Ok(deleted)
    }

    /// Queue `ids` for deletion by the next [`reap`](Self::reap).
    pub(crate) fn schedule_delete(&self, ids: impl IntoIterator<Item = MessageId>) -> FailureResult<()> {
        self.pending_deletes
            .lock()
            .map_err(|_| Failure::poisoned("pending deletes"))?
            .extend(ids);
        Ok(())
    }

    // =========================================================================
    // Durable index
    // =========================================================================

    pub fn is_enqueued(&self, queue: &str, message_id: MessageId) -> FailureResult<bool> {
        Ok(self
            .durable()?
            .contains_key(&(queue.to_string(), message_id)))
    }

    /// Durable enqueue records of `queue`, in enqueue order.
    pub fn enqueued(&self, queue: &str) -> FailureResult<Vec<EnqueueRecord>> {
        let mut records: Vec<EnqueueRecord> = self
            .durable()?
            .values()
            .filter(|entry| entry.record.queue == queue)
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by_key(|record| record.position);
        Ok(records)
    }

    pub fn durable_count(&self) -> FailureResult<usize> {
        Ok(self.durable()?.len())
    }

    /// Drop the whole index, releasing its references.
    pub(crate) fn reset(&self) -> FailureResult<()> {
        self.durable()?.clear();
        Ok(())
    }

    /// Register a recovered enqueue record.
    pub(crate) fn restore(&self, record: EnqueueRecord) -> FailureResult<()> {
        let reference = self.references.acquire(record.message_id);
        self.next_position
            .fetch_max(record.position + 1, Ordering::Relaxed);
        self.durable()?.insert(
            (record.queue.clone(), record.message_id),
            DurableEntry {
                record,
                _reference: reference,
            },
        );
        Ok(())
    }
}
