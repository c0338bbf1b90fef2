//! Transactions
//!
//! A [`Transaction`] stages enqueue and dequeue operations, each with an
//! optional [`TransactionAction`]. Nothing is visible to anyone else until
//! commit. Callback panics are contained: they are logged and counted, and
//! the remaining callbacks and reference releases still run.
//!
//! A transaction dropped while OPEN rolls itself back.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use uuid::Uuid;

use super::action::TransactionAction;
use super::state::TransactionState;
use crate::failure::FailureResult;
use crate::message::{EnqueueRecord, Message, MessageId, MessageReference};
use crate::observability::{Event, MetricsRegistry};

pub(crate) enum StagedOp {
    Enqueue {
        queue: String,
        message: Message,
        /// Keeps the message alive until the outcome is known.
        reference: MessageReference,
    },
    Dequeue {
        queue: String,
        message_id: MessageId,
    },
}

struct Staged {
    op: Option<StagedOp>,
    action: Option<Box<dyn TransactionAction>>,
}

/// Owned copy of a staged operation, used while the commit is in flight.
#[derive(Debug, Clone)]
pub(crate) enum PlannedOp {
    Enqueue { queue: String, message: Message },
    Dequeue { queue: String, message_id: MessageId },
}

impl PlannedOp {
    pub(crate) fn queue(&self) -> &str {
        match self {
            PlannedOp::Enqueue { queue, .. } | PlannedOp::Dequeue { queue, .. } => queue,
        }
    }
}

pub struct Transaction {
    id: Uuid,
    state: TransactionState,
    staged: Vec<Staged>,
    metrics: Arc<MetricsRegistry>,
}

impl Transaction {
    pub(crate) fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TransactionState::Open,
            staged: Vec::new(),
            metrics,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Staged (enqueues, dequeues).
    pub(crate) fn op_counts(&self) -> (usize, usize) {
        self.staged
            .iter()
            .filter_map(|staged| staged.op.as_ref())
            .fold((0, 0), |(enqueues, dequeues), op| match op {
                StagedOp::Enqueue { .. } => (enqueues + 1, dequeues),
                StagedOp::Dequeue { .. } => (enqueues, dequeues + 1),
            })
    }

    pub(crate) fn stage(
        &mut self,
        op: StagedOp,
        action: Option<Box<dyn TransactionAction>>,
    ) -> FailureResult<()> {
        if self.state != TransactionState::Open {
            return Err(crate::failure::Failure::validation(format!(
                "cannot stage work on transaction {} in state {}",
                self.id, self.state
            )));
        }
        self.staged.push(Staged {
            op: Some(op),
            action,
        });
        Ok(())
    }

    /// Owned copies of the staged operations, in staging order.
    pub(crate) fn plan(&self) -> Vec<PlannedOp> {
        self.staged
            .iter()
            .filter_map(|staged| staged.op.as_ref())
            .map(|op| match op {
                StagedOp::Enqueue { queue, message, .. } => PlannedOp::Enqueue {
                    queue: queue.clone(),
                    message: message.clone(),
                },
                StagedOp::Dequeue { queue, message_id } => PlannedOp::Dequeue {
                    queue: queue.clone(),
                    message_id: *message_id,
                },
            })
            .collect()
    }

    pub(crate) fn begin_commit(&mut self) -> FailureResult<()> {
        self.state = self.state.begin_commit()?;
        Ok(())
    }

    /// COMMITTING → COMMITTED, then run every post-commit callback in
    /// staging order. `records[i]` belongs to the i-th staged operation.
    ///
    /// Returns the number of callbacks that panicked.
    pub(crate) fn complete_commit(&mut self, records: &[EnqueueRecord]) -> FailureResult<u64> {
        self.state = self.state.complete()?;
        let mut panics = 0;
        for (index, staged) in self.staged.iter_mut().enumerate() {
            if let Some(action) = staged.action.take() {
                let record = records.get(index).map(std::slice::from_ref).unwrap_or(&[]);
                if catch_unwind(AssertUnwindSafe(|| action.post_commit(record))).is_err() {
                    panics += 1;
                    tracing::error!(
                        event = %Event::CallbackPanicked,
                        transaction = %self.id,
                        index,
                        "post-commit action panicked"
                    );
                }
            }
            // Releases the staged reference.
            staged.op.take();
        }
        Ok(panics)
    }

    /// Move to ROLLED_BACK and run every rollback callback in staging order.
    ///
    /// Returns the number of callbacks that panicked.
    pub(crate) fn roll_back(&mut self) -> FailureResult<u64> {
        self.state = self.state.roll_back()?;
        let mut panics = 0;
        for (index, staged) in self.staged.iter_mut().enumerate() {
            if let Some(action) = staged.action.take() {
                if catch_unwind(AssertUnwindSafe(|| action.on_rollback())).is_err() {
                    panics += 1;
                    tracing::error!(
                        event = %Event::CallbackPanicked,
                        transaction = %self.id,
                        index,
                        "rollback action panicked"
                    );
                }
            }
            staged.op.take();
        }
        Ok(panics)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.state == TransactionState::Open {
            if self.staged.is_empty() {
                return;
            }
            tracing::warn!(
                event = %Event::TransactionAutoRolledBack,
                transaction = %self.id,
                operations = self.staged.len(),
                "open transaction dropped, rolling back"
            );
        } else {
            tracing::error!(
                event = %Event::TransactionAutoRolledBack,
                transaction = %self.id,
                state = %self.state,
                "transaction dropped mid-commit, rolling back"
            );
        }
        self.metrics.increment_auto_rolled_back();
        if let Ok(panics) = self.roll_back() {
            self.metrics.add_callback_panics(panics);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("operations", &self.staged.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReferenceCounter;
    use crate::txn::action;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn staged_enqueue(counter: &ReferenceCounter, id: u64) -> StagedOp {
        let message = Message::new(MessageId(id), b"x".to_vec());
        StagedOp::Enqueue {
            queue: "q".to_string(),
            reference: counter.acquire(message.id()),
            message,
        }
    }

    #[test]
    fn test_drop_while_open_rolls_back() {
        let counter = ReferenceCounter::new();
        let metrics = Arc::new(MetricsRegistry::new());
        let rolled_back = Arc::new(AtomicUsize::new(0));

        {
            let mut txn = Transaction::new(metrics.clone());
            let r = rolled_back.clone();
            txn.stage(
                staged_enqueue(&counter, 1),
                Some(Box::new(action(|_: &[EnqueueRecord]| {}, move || {
                    r.fetch_add(1, Ordering::SeqCst);
                }))),
            )
            .unwrap();
            assert_eq!(counter.count(MessageId(1)), 1);
        }

        assert_eq!(rolled_back.load(Ordering::SeqCst), 1);
        assert_eq!(counter.count(MessageId(1)), 0);
        assert_eq!(metrics.snapshot().transactions_auto_rolled_back, 1);
    }

    #[test]
    fn test_post_commit_panic_is_contained() {
        let counter = ReferenceCounter::new();
        let mut txn = Transaction::new(Arc::new(MetricsRegistry::new()));
        let ran = Arc::new(AtomicUsize::new(0));

        txn.stage(
            staged_enqueue(&counter, 1),
            Some(Box::new(action(
                |_: &[EnqueueRecord]| panic!("consumer bug"),
                || {},
            ))),
        )
        .unwrap();
        let r = ran.clone();
        txn.stage(
            staged_enqueue(&counter, 2),
            Some(Box::new(action(
                move |_: &[EnqueueRecord]| {
                    r.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            ))),
        )
        .unwrap();

        txn.begin_commit().unwrap();
        let panics = txn.complete_commit(&[]).unwrap();

        assert_eq!(panics, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(counter.live_messages(), 0);
    }

    #[test]
    fn test_cannot_stage_after_commit_started() {
        let counter = ReferenceCounter::new();
        let mut txn = Transaction::new(Arc::new(MetricsRegistry::new()));
        txn.begin_commit().unwrap();
        assert!(txn.stage(staged_enqueue(&counter, 3), None).is_err());
        txn.roll_back().unwrap();
        // The rejected operation's reference was dropped with it.
        assert_eq!(counter.count(MessageId(3)), 0);
    }
}
