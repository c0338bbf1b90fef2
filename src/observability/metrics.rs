//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Lock-free; Relaxed ordering is enough for counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        /// Operational counters for one node.
        #[derive(Debug, Default)]
        pub struct MetricsRegistry {
            $($(#[$doc])* $name: AtomicU64,)*
        }

        /// Point-in-time copy of every counter.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        pub struct MetricsSnapshot {
            $(pub $name: u64,)*
        }

        impl MetricsRegistry {
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    transactions_begun,
    /// Transactions that reached COMMITTED
    transactions_committed,
    /// Explicit rollbacks and failed commits
    transactions_rolled_back,
    /// Open transactions dropped without commit or rollback
    transactions_auto_rolled_back,
    /// Commits that failed with a connection-scoped failure
    commit_failures_connection,
    /// Commits that failed with a server-scoped failure
    commit_failures_server,
    /// Compensating batches written after a failed quorum wait
    compensations_written,
    /// Post-commit or rollback callbacks that panicked
    callback_panics,
    messages_created,
    messages_deleted,
    references_acquired,
    references_released,
    enqueues_committed,
    dequeues_committed,
    replication_frames_sent,
    replication_acks,
    replication_ack_failures,
    replicated_batches_applied,
    /// Frames refused because they carried a superseded epoch
    stale_frames_rejected,
    role_changes,
    transfers_requested,
    transfers_succeeded,
    transfers_failed,
    nodes_joined,
    nodes_removed,
    access_denied,
    recovery_runs,
    orphans_deleted,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Transactions

    pub fn increment_begun(&self) {
        Self::bump(&self.transactions_begun);
    }

    pub fn increment_committed(&self) {
        Self::bump(&self.transactions_committed);
    }

    pub fn increment_rolled_back(&self) {
        Self::bump(&self.transactions_rolled_back);
    }

    pub fn increment_auto_rolled_back(&self) {
        Self::bump(&self.transactions_auto_rolled_back);
    }

    pub fn increment_commit_failure(&self, fatal: bool) {
        if fatal {
            Self::bump(&self.commit_failures_server);
        } else {
            Self::bump(&self.commit_failures_connection);
        }
    }

    pub fn increment_compensations(&self) {
        Self::bump(&self.compensations_written);
    }

    pub fn add_callback_panics(&self, count: u64) {
        self.callback_panics.fetch_add(count, Ordering::Relaxed);
    }

    // Messages

    pub fn increment_messages_created(&self) {
        Self::bump(&self.messages_created);
    }

    pub fn add_messages_deleted(&self, count: u64) {
        self.messages_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_references_acquired(&self) {
        Self::bump(&self.references_acquired);
    }

    pub fn increment_references_released(&self) {
        Self::bump(&self.references_released);
    }

    pub fn add_enqueues(&self, count: u64) {
        self.enqueues_committed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dequeues(&self, count: u64) {
        self.dequeues_committed.fetch_add(count, Ordering::Relaxed);
    }

    // Replication

    pub fn increment_frames_sent(&self) {
        Self::bump(&self.replication_frames_sent);
    }

    pub fn increment_acks(&self) {
        Self::bump(&self.replication_acks);
    }

    pub fn increment_ack_failures(&self) {
        Self::bump(&self.replication_ack_failures);
    }

    pub fn increment_batches_applied(&self) {
        Self::bump(&self.replicated_batches_applied);
    }

    pub fn increment_stale_frames(&self) {
        Self::bump(&self.stale_frames_rejected);
    }

    // Group administration

    pub fn increment_role_changes(&self) {
        Self::bump(&self.role_changes);
    }

    pub fn increment_transfers_requested(&self) {
        Self::bump(&self.transfers_requested);
    }

    pub fn increment_transfers_succeeded(&self) {
        Self::bump(&self.transfers_succeeded);
    }

    pub fn increment_transfers_failed(&self) {
        Self::bump(&self.transfers_failed);
    }

    pub fn increment_nodes_joined(&self) {
        Self::bump(&self.nodes_joined);
    }

    pub fn increment_nodes_removed(&self) {
        Self::bump(&self.nodes_removed);
    }

    pub fn increment_access_denied(&self) {
        Self::bump(&self.access_denied);
    }

    // Recovery

    pub fn increment_recovery_runs(&self) {
        Self::bump(&self.recovery_runs);
    }

    pub fn add_orphans_deleted(&self, count: u64) {
        self.orphans_deleted.fetch_add(count, Ordering::Relaxed);
    }

    /// All counters as a JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_committed();
        registry.increment_committed();
        registry.increment_commit_failure(true);
        registry.increment_commit_failure(false);
        registry.add_callback_panics(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.transactions_committed, 2);
        assert_eq!(snapshot.commit_failures_server, 1);
        assert_eq!(snapshot.commit_failures_connection, 1);
        assert_eq!(snapshot.callback_panics, 3);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_transfers_succeeded();
        let json: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(json["transfers_succeeded"], 1);
        assert_eq!(json["nodes_removed"], 0);
    }
}
