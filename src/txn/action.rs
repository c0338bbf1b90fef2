//! Transaction callbacks
//!
//! An action is attached to one staged operation. Exactly one of its two
//! methods runs, exactly once: `post_commit` after the transaction is
//! durable, or `on_rollback` if it is not.

use crate::message::EnqueueRecord;

pub trait TransactionAction: Send {
    /// The operation is durable. `records` holds the enqueue record the
    /// operation created or removed.
    fn post_commit(self: Box<Self>, records: &[EnqueueRecord]);

    /// The operation was discarded.
    fn on_rollback(self: Box<Self>);
}

/// Action built from two closures.
pub struct FnAction<C, R> {
    post_commit: C,
    on_rollback: R,
}

impl<C, R> TransactionAction for FnAction<C, R>
where
    C: FnOnce(&[EnqueueRecord]) + Send,
    R: FnOnce() + Send,
{
    fn post_commit(self: Box<Self>, records: &[EnqueueRecord]) {
        (self.post_commit)(records)
    }

    fn on_rollback(self: Box<Self>) {
        (self.on_rollback)()
    }
}

/// Build an action from a post-commit and a rollback closure.
pub fn action<C, R>(post_commit: C, on_rollback: R) -> FnAction<C, R>
where
    C: FnOnce(&[EnqueueRecord]) + Send,
    R: FnOnce() + Send,
{
    FnAction {
        post_commit,
        on_rollback,
    }
}

/// Does nothing either way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAction;

impl TransactionAction for NoAction {
    fn post_commit(self: Box<Self>, _records: &[EnqueueRecord]) {}

    fn on_rollback(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_action_runs_one_side() {
        let committed = Arc::new(AtomicUsize::new(0));
        let rolled_back = Arc::new(AtomicUsize::new(0));

        let c = committed.clone();
        let r = rolled_back.clone();
        let boxed: Box<dyn TransactionAction> = Box::new(action(
            move |records: &[EnqueueRecord]| {
                c.fetch_add(records.len(), Ordering::SeqCst);
            },
            move || {
                r.fetch_add(1, Ordering::SeqCst);
            },
        ));

        boxed.post_commit(&[EnqueueRecord {
            queue: "q".to_string(),
            message_id: MessageId(1),
            position: 0,
        }]);
        assert_eq!(committed.load(Ordering::SeqCst), 1);
        assert_eq!(rolled_back.load(Ordering::SeqCst), 0);
    }
}
