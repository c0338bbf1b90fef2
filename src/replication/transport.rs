//! Replication transport boundary
//!
//! The transport carries group traffic: contact, master transfer, batch
//! shipping and membership removal. Long-running calls return a
//! [`PendingOperation`] immediately; the caller decides how long to wait.
//!
//! Errors coming back from the transport are opaque. They are classified
//! exactly once, in [`PendingOperation::wait`]:
//! - no outcome within the timeout: connection-scoped
//! - an error carrying a scoped failure: that failure, unchanged
//! - any other error, or an operation abandoned by the transport:
//!   server-scoped

use std::error::Error;
use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;

use super::node::NodeDescriptor;
use crate::failure::{into_scoped_failure, Failure, FailureResult};
use crate::storage::WriteBatch;

/// Error type produced by transport implementations.
pub type TransportError = Box<dyn Error + Send + Sync + 'static>;

/// A committed batch on its way from the master to a replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationFrame {
    /// Name of the sending master.
    pub source: String,
    /// Epoch under which the master wrote the batch.
    pub epoch: u64,
    /// Master-local batch sequence.
    pub sequence: u64,
    pub batch: WriteBatch,
}

/// Completion side of a [`PendingOperation`].
pub struct Completion<T = ()> {
    sender: oneshot::Sender<Result<T, TransportError>>,
}

impl<T> Completion<T> {
    /// Deliver the outcome. Returns `false` if nobody is waiting any more.
    pub fn complete(self, result: Result<T, TransportError>) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn succeed(self, value: T) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(self, error: impl Into<TransportError>) -> bool {
        self.complete(Err(error.into()))
    }
}

/// Handle on an operation the transport is still performing.
#[must_use = "a pending operation does nothing unless waited on"]
pub struct PendingOperation<T = ()> {
    description: String,
    receiver: oneshot::Receiver<Result<T, TransportError>>,
}

impl<T> PendingOperation<T> {
    /// A pending operation and the handle that completes it.
    pub fn channel(description: impl Into<String>) -> (Completion<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            Completion { sender },
            Self {
                description: description.into(),
                receiver,
            },
        )
    }

    /// An operation whose outcome is already known.
    pub fn ready(description: impl Into<String>, result: Result<T, TransportError>) -> Self {
        let (completion, pending) = Self::channel(description);
        completion.complete(result);
        pending
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Wait at most `timeout` for the outcome and classify any failure.
    pub async fn wait(self, timeout: Duration) -> FailureResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Err(_elapsed) => Err(Failure::connection_scoped(format!(
                "{} did not complete within {} ms",
                self.description,
                timeout.as_millis()
            ))),
            Ok(Err(_abandoned)) => Err(Failure::server_scoped(format!(
                "{} was abandoned by the transport",
                self.description
            ))),
            Ok(Ok(Err(error))) => Err(into_scoped_failure(error, &self.description)),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("description", &self.description)
            .finish()
    }
}

/// Group communication used by the replication manager.
pub trait ReplicationTransport: Send + Sync {
    /// Establish contact with `node`.
    fn contact(&self, node: &NodeDescriptor) -> PendingOperation;

    /// Ask the group to make `target` master under `epoch`.
    fn transfer_master(&self, target: &NodeDescriptor, epoch: u64) -> PendingOperation;

    /// Ship a committed batch to `target`; completes on its acknowledgement.
    fn replicate(&self, target: &NodeDescriptor, frame: &ReplicationFrame) -> PendingOperation;

    /// Remove `name` from the group membership.
    ///
    /// `Ok(false)` means the group did not know the node.
    fn remove_node(&self, name: &str) -> Result<bool, TransportError>;
}
