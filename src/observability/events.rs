//! Observable lifecycle events
//!
//! Every structured log line emitted by the store and the group manager
//! carries one of these names in its `event` field.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    StoreOpened,
    StoreClosed,
    RecoveryStart,
    RecoveryComplete,
    OrphansDeleted,

    // Transactions
    TransactionCommitted,
    TransactionRolledBack,
    TransactionAutoRolledBack,
    CommitRejected,
    CompensationWritten,
    CallbackPanicked,
    MessagesDeleted,

    // Group
    GroupStarted,
    NodeJoined,
    NodeRemoved,
    RoleChanged,
    StaleMasterFenced,
    ReplicaAckFailed,
    TransferRequested,
    TransferSucceeded,
    TransferFailed,
    AccessDenied,

    /// The node must stop serving.
    ServerScopedFailure,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::RecoveryStart => "RECOVERY_START",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",
            Event::OrphansDeleted => "ORPHANS_DELETED",
            Event::TransactionCommitted => "TXN_COMMITTED",
            Event::TransactionRolledBack => "TXN_ROLLED_BACK",
            Event::TransactionAutoRolledBack => "TXN_AUTO_ROLLED_BACK",
            Event::CommitRejected => "COMMIT_REJECTED",
            Event::CompensationWritten => "COMPENSATION_WRITTEN",
            Event::CallbackPanicked => "CALLBACK_PANICKED",
            Event::MessagesDeleted => "MESSAGES_DELETED",
            Event::GroupStarted => "GROUP_STARTED",
            Event::NodeJoined => "NODE_JOINED",
            Event::NodeRemoved => "NODE_REMOVED",
            Event::RoleChanged => "ROLE_CHANGED",
            Event::StaleMasterFenced => "STALE_MASTER_FENCED",
            Event::ReplicaAckFailed => "REPLICA_ACK_FAILED",
            Event::TransferRequested => "TRANSFER_REQUESTED",
            Event::TransferSucceeded => "TRANSFER_SUCCEEDED",
            Event::TransferFailed => "TRANSFER_FAILED",
            Event::AccessDenied => "ACCESS_DENIED",
            Event::ServerScopedFailure => "SERVER_SCOPED_FAILURE",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ServerScopedFailure)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_scoped_is_fatal() {
        assert!(Event::ServerScopedFailure.is_fatal());
        assert!(!Event::TransferFailed.is_fatal());
        assert!(!Event::CommitRejected.is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::RoleChanged.to_string(), "ROLE_CHANGED");
    }
}
