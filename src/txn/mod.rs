//! Transaction coordinator
//!
//! Groups enqueue and dequeue operations, possibly across queues, into one
//! atomic unit.
//!
//! # Guarantees
//!
//! - Every staged action receives exactly one callback: `post_commit` if
//!   the commit succeeded, `on_rollback` otherwise
//! - Callbacks run in staging order
//! - A failed commit leaves the transaction ROLLED_BACK with no
//!   `post_commit` having run
//! - Commits touching the same queue are serialized; disjoint queues
//!   commit concurrently

mod action;
mod coordinator;
mod state;
mod transaction;

pub use action::{action, FnAction, NoAction, TransactionAction};
pub use coordinator::{CommitReceipt, TransactionCoordinator};
pub use state::TransactionState;
pub use transaction::Transaction;
