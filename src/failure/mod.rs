//! Failure taxonomy and classification
//!
//! Validation and access-denied failures are returned before any mutation
//! begins. Connection- vs server-scoped classification happens where an
//! asynchronous operation's result is collected.

mod classifier;
mod errors;

pub use classifier::{classify, into_scoped_failure};
pub use errors::{Failure, FailureKind, FailureResult, FailureScope};
