//! Replication group manager
//!
//! Owns membership, the local node's role and the group epoch.
//!
//! # Invariants
//!
//! - At most one member is MASTER for a given epoch
//! - Epochs only move forward; a frame or election result carrying an
//!   older epoch is refused
//! - A node stops admitting writes before it records that it is no longer
//!   master: stepping down waits for every in-flight commit to finish
//! - Role and epoch changes are written durably before they are published
//!
//! Locks, outermost first: `role_change` (async, serializes role changes),
//! `write_gate` (async, commits read, step-down writes), `members` (sync,
//! never held across an await).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedRwLockReadGuard, RwLock};

use super::config::{Durability, ReplicationConfig};
use super::node::{node_key, NodeDescriptor, EPOCH_KEY, NODE_PREFIX};
use super::role::{NodeRole, RoleCell};
use super::transport::{PendingOperation, ReplicationFrame, ReplicationTransport};
use crate::failure::{into_scoped_failure, Failure, FailureResult};
use crate::observability::{Event, MetricsRegistry};
use crate::storage::{RecordStore, WriteBatch};
use crate::transfer::{validate_target, TransferController, TransferState, TransferTicket};

/// Local role and epoch as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSnapshot {
    pub role: NodeRole,
    pub epoch: u64,
}

/// Permission to run one write transaction as master.
///
/// Held for the whole commit. A node stepping down waits until every
/// admission has been dropped.
#[must_use]
pub struct WriteAdmission {
    epoch: u64,
    _gate: OwnedRwLockReadGuard<()>,
}

impl WriteAdmission {
    /// Epoch the write is performed under.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A master transfer handed to the transport but not yet waited on.
#[derive(Debug)]
pub struct PendingTransfer {
    pub target: String,
    /// Epoch the target will hold once the transfer completes.
    pub epoch: u64,
    pub operation: PendingOperation,
}

fn encode_epoch(epoch: u64) -> FailureResult<Vec<u8>> {
    serde_json::to_vec(&epoch)
        .map_err(|e| Failure::server_scoped("failed to encode group epoch").with_source(e))
}

fn decode_epoch(bytes: &[u8]) -> FailureResult<u64> {
    serde_json::from_slice(bytes)
        .map_err(|e| Failure::server_scoped("corrupt group epoch record").with_source(e))
}

pub struct ReplicationGroup {
    config: ReplicationConfig,
    records: Arc<dyn RecordStore>,
    transport: Arc<dyn ReplicationTransport>,
    metrics: Arc<MetricsRegistry>,
    local: RoleCell,
    members: Mutex<BTreeMap<String, NodeDescriptor>>,
    write_gate: Arc<RwLock<()>>,
    role_change: AsyncMutex<()>,
    role_watch: watch::Sender<RoleSnapshot>,
    transfers: TransferController,
    applied_batches: AtomicU64,
}

impl ReplicationGroup {
    /// Load membership and epoch from `records`, recording the local node
    /// and any configured helpers that are not yet known.
    ///
    /// The local node starts as UNKNOWN until [`start`](Self::start).
    pub fn open(
        config: ReplicationConfig,
        records: Arc<dyn RecordStore>,
        transport: Arc<dyn ReplicationTransport>,
        metrics: Arc<MetricsRegistry>,
    ) -> FailureResult<Self> {
        config.validate()?;

        let mut members = BTreeMap::new();
        for (_, bytes) in records.scan(NODE_PREFIX)? {
            let node = NodeDescriptor::decode(&bytes)?;
            members.insert(node.name.clone(), node);
        }
        let epoch = match records.get(EPOCH_KEY)? {
            Some(bytes) => decode_epoch(&bytes)?,
            None => 0,
        };

        if let Some(existing) = members.get(&config.node_name) {
            if existing.role.is_terminal() {
                return Err(Failure::validation(format!(
                    "node '{}' was removed from group '{}'",
                    config.node_name, config.group_name
                )));
            }
        }

        let mut batch = WriteBatch::new();
        let mut local = members
            .get(&config.node_name)
            .cloned()
            .unwrap_or_else(|| config.local_descriptor());
        local.address = config.node_address.clone();
        local.monitor = config.monitor;
        local.role = NodeRole::Unknown;
        batch.put(node_key(&local.name), local.encode()?);
        members.insert(local.name.clone(), local);

        for helper in &config.helpers {
            if !members.contains_key(&helper.name) {
                let node = helper.descriptor();
                batch.put(node_key(&node.name), node.encode()?);
                members.insert(node.name.clone(), node);
            }
        }
        records.write_batch(&batch)?;

        tracing::info!(
            group = %config.group_name,
            node = %config.node_name,
            members = members.len(),
            epoch,
            "replication group opened"
        );

        let (role_watch, _) = watch::channel(RoleSnapshot {
            role: NodeRole::Unknown,
            epoch,
        });

        Ok(Self {
            config,
            records,
            transport,
            metrics,
            local: RoleCell::new(NodeRole::Unknown, epoch),
            members: Mutex::new(members),
            write_gate: Arc::new(RwLock::new(())),
            role_change: AsyncMutex::new(()),
            role_watch,
            transfers: TransferController::new(),
            applied_batches: AtomicU64::new(0),
        })
    }

    fn members(&self) -> FailureResult<MutexGuard<'_, BTreeMap<String, NodeDescriptor>>> {
        self.members
            .lock()
            .map_err(|_| Failure::poisoned("group membership"))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn local_name(&self) -> &str {
        &self.config.node_name
    }

    /// Local role and epoch, read without locking.
    pub fn snapshot(&self) -> RoleSnapshot {
        let (role, epoch) = self.local.snapshot();
        RoleSnapshot { role, epoch }
    }

    pub fn local_role(&self) -> NodeRole {
        self.local.role()
    }

    pub fn epoch(&self) -> u64 {
        self.local.epoch()
    }

    /// Notified after every local role or epoch change.
    pub fn subscribe(&self) -> watch::Receiver<RoleSnapshot> {
        self.role_watch.subscribe()
    }

    /// Role of `name` as last learned by this node.
    pub fn get_role(&self, name: &str) -> FailureResult<NodeRole> {
        if name == self.config.node_name {
            return Ok(self.local.role());
        }
        self.members()?
            .get(name)
            .map(|node| node.role)
            .ok_or_else(|| self.unknown_node(name))
    }

    /// All members, ordered by name.
    pub fn list_members(&self) -> FailureResult<Vec<NodeDescriptor>> {
        Ok(self.members()?.values().cloned().collect())
    }

    pub fn member(&self, name: &str) -> FailureResult<Option<NodeDescriptor>> {
        Ok(self.members()?.get(name).cloned())
    }

    pub fn current_master(&self) -> FailureResult<Option<String>> {
        Ok(self
            .members()?
            .values()
            .find(|node| node.role == NodeRole::Master)
            .map(|node| node.name.clone()))
    }

    /// Acknowledgements a commit needs, counting the master itself.
    pub fn quorum_size(&self) -> FailureResult<usize> {
        let voting = self.members()?.values().filter(|n| n.is_voting()).count();
        Ok(voting / 2 + 1)
    }

    /// Batches received from a master and applied locally since open.
    pub fn applied_batches(&self) -> u64 {
        self.applied_batches.load(Ordering::Acquire)
    }

    pub fn transfer_state(&self) -> TransferState {
        self.transfers.state()
    }

    fn unknown_node(&self, name: &str) -> Failure {
        Failure::validation(format!(
            "node '{}' is not a member of group '{}'",
            name, self.config.group_name
        ))
    }

    fn require_member(&self, name: &str) -> FailureResult<NodeDescriptor> {
        self.member(name)?.ok_or_else(|| self.unknown_node(name))
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Contact the group and become a replica. A sole voting member elects
    /// itself master under the next epoch.
    ///
    /// Peers that do not answer stay UNKNOWN and receive no replication
    /// traffic until they are contacted again.
    pub async fn start(&self) -> FailureResult<RoleSnapshot> {
        let local = self.require_member(&self.config.node_name)?;
        self.transport
            .contact(&local)
            .wait(self.config.ack_timeout)
            .await?;
        self.mark_contacted(&local.name).await?;

        let peers: Vec<NodeDescriptor> = self
            .members()?
            .values()
            .filter(|n| n.name != local.name && n.role == NodeRole::Unknown)
            .cloned()
            .collect();
        for peer in peers {
            match self.transport.contact(&peer).wait(self.config.ack_timeout).await {
                Ok(()) => self.mark_contacted(&peer.name).await?,
                Err(failure) => tracing::warn!(
                    node = %peer.name,
                    error = %failure,
                    "peer did not answer"
                ),
            }
        }

        let sole_voter = {
            let members = self.members()?;
            local.is_voting() && members.values().filter(|n| n.is_voting()).count() == 1
        };
        if sole_voter && self.local.role() != NodeRole::Master {
            self.on_election_result(&local.name, self.local.epoch() + 1)
                .await?;
        }

        let snapshot = self.snapshot();
        tracing::info!(
            event = %Event::GroupStarted,
            node = %local.name,
            role = %snapshot.role,
            epoch = snapshot.epoch,
            "joined replication group"
        );
        Ok(snapshot)
    }

    /// Add a member. It is UNKNOWN until the transport confirms contact,
    /// then REPLICA. If contact fails the member stays recorded as UNKNOWN.
    pub async fn join_group(&self, node: NodeDescriptor) -> FailureResult<NodeDescriptor> {
        node.validate()?;
        let node = NodeDescriptor {
            role: NodeRole::Unknown,
            ..node
        };

        {
            let mut members = self.members()?;
            if members.contains_key(&node.name) {
                return Err(Failure::validation(format!(
                    "node '{}' is already a member of group '{}'",
                    node.name, self.config.group_name
                )));
            }
            self.records.put(&node_key(&node.name), node.encode()?)?;
            members.insert(node.name.clone(), node.clone());
        }
        self.metrics.increment_nodes_joined();
        tracing::info!(event = %Event::NodeJoined, node = %node.name, address = %node.address, "node joined group");

        self.transport
            .contact(&node)
            .wait(self.config.ack_timeout)
            .await?;
        self.mark_contacted(&node.name).await?;
        self.require_member(&node.name)
    }

    async fn mark_contacted(&self, name: &str) -> FailureResult<()> {
        let _serial = self.role_change.lock().await;
        let mut members = self.members()?;
        let Some(node) = members.get(name) else {
            return Err(self.unknown_node(name));
        };
        if node.role != NodeRole::Unknown {
            return Ok(());
        }
        let updated = NodeDescriptor {
            role: NodeRole::Replica,
            ..node.clone()
        };
        self.records.put(&node_key(name), updated.encode()?)?;
        members.insert(name.to_string(), updated);
        drop(members);

        if name == self.config.node_name {
            let epoch = self.local.epoch();
            self.publish(NodeRole::Replica, epoch);
        }
        Ok(())
    }

    /// Remove `name` from the group.
    ///
    /// The master cannot be removed; transfer mastership away first.
    /// Returns `false` if the group did not know the node.
    pub async fn remove_node_from_group(&self, name: &str) -> FailureResult<bool> {
        // Held until the membership change is written so no transfer or
        // election can promote the node in between.
        let _serial = self.role_change.lock().await;
        let node = self.require_member(name)?;
        if node.role == NodeRole::Master {
            return Err(Failure::validation(format!(
                "cannot remove master '{}'; transfer mastership first",
                name
            )));
        }

        match self.transport.remove_node(name) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(error) => {
                return Err(into_scoped_failure(
                    error,
                    &format!("remove node '{}' from group", name),
                ))
            }
        }

        let mut members = self.members()?;
        if name == self.config.node_name {
            let detached = NodeDescriptor {
                role: NodeRole::Detached,
                ..node
            };
            self.records.put(&node_key(name), detached.encode()?)?;
            members.insert(name.to_string(), detached);
            drop(members);
            self.publish(NodeRole::Detached, self.local.epoch());
        } else {
            self.records.delete(&node_key(name))?;
            members.remove(name);
        }

        self.metrics.increment_nodes_removed();
        tracing::info!(event = %Event::NodeRemoved, node = %name, "node removed from group");
        Ok(true)
    }

    /// Replace a member's free-form description.
    pub fn update_description(&self, name: &str, description: Option<String>) -> FailureResult<()> {
        self.update_member(name, |node| node.description = description)
            .map(|_| ())
    }

    /// Rewrite a member's settings. Role and name are owned by the group
    /// and cannot be changed here.
    pub(crate) fn update_member(
        &self,
        name: &str,
        edit: impl FnOnce(&mut NodeDescriptor),
    ) -> FailureResult<NodeDescriptor> {
        let mut members = self.members()?;
        let Some(node) = members.get(name) else {
            return Err(self.unknown_node(name));
        };
        let mut updated = node.clone();
        edit(&mut updated);
        updated.name = node.name.clone();
        updated.role = node.role;
        updated.validate()?;
        self.records.put(&node_key(name), updated.encode()?)?;
        members.insert(name.to_string(), updated.clone());
        Ok(updated)
    }

    // =========================================================================
    // Roles and epochs
    // =========================================================================

    fn publish(&self, role: NodeRole, epoch: u64) {
        let previous = self.local.role();
        self.local.store(role, epoch);
        self.role_watch.send_replace(RoleSnapshot { role, epoch });
        if previous != role {
            self.metrics.increment_role_changes();
            tracing::info!(
                event = %Event::RoleChanged,
                node = %self.config.node_name,
                from = %previous,
                to = %role,
                epoch,
                "local role changed"
            );
        }
    }

    /// Make `master` the sole master under `epoch`, demoting any previous
    /// master. Drains in-flight commits first if the local node steps down.
    async fn install_master(&self, master: &str, epoch: u64) -> FailureResult<()> {
        let _serial = self.role_change.lock().await;
        let (local_role, current_epoch) = self.local.snapshot();
        if epoch < current_epoch {
            return Err(Failure::connection_scoped(format!(
                "epoch {} is superseded by epoch {}",
                epoch, current_epoch
            )));
        }
        if epoch == current_epoch {
            if let Some(current) = self.current_master()? {
                if current != master {
                    return Err(Failure::connection_scoped(format!(
                        "epoch {} already belongs to master '{}', refusing '{}'",
                        epoch, current, master
                    )));
                }
            }
        }

        if self.member(master)?.is_none() {
            return Err(Failure::connection_scoped(format!(
                "'{}' left the group before it could become master",
                master
            )));
        }

        let local_name = self.config.node_name.as_str();
        let local_after = if master == local_name {
            NodeRole::Master
        } else if local_role.is_terminal() {
            NodeRole::Detached
        } else {
            NodeRole::Replica
        };
        local_role.check_transition(local_after)?;

        let _drain = if local_role == NodeRole::Master && local_after != NodeRole::Master {
            Some(self.write_gate.write().await)
        } else {
            None
        };

        {
            let mut members = self.members()?;
            let mut changed = Vec::new();
            for node in members.values() {
                let role = if node.name == master {
                    NodeRole::Master
                } else if node.name == local_name {
                    local_after
                } else if node.role == NodeRole::Master {
                    NodeRole::Replica
                } else {
                    continue;
                };
                if role != node.role {
                    changed.push(NodeDescriptor {
                        role,
                        ..node.clone()
                    });
                }
            }

            let mut batch = WriteBatch::new();
            for node in &changed {
                batch.put(node_key(&node.name), node.encode()?);
            }
            batch.put(EPOCH_KEY, encode_epoch(epoch)?);
            self.records.write_batch(&batch)?;

            for node in changed {
                if node.name != local_name {
                    tracing::debug!(node = %node.name, role = %node.role, epoch, "member role updated");
                }
                members.insert(node.name.clone(), node);
            }
        }

        self.publish(local_after, epoch);
        Ok(())
    }

    /// Admit one write transaction. Only the master admits writes.
    pub async fn admit_write(&self) -> FailureResult<WriteAdmission> {
        let gate = Arc::clone(&self.write_gate).read_owned().await;
        let (role, epoch) = self.local.snapshot();
        if !role.can_write() {
            let master = self.current_master()?;
            return Err(Failure::connection_scoped(format!(
                "node '{}' is {} and does not accept writes (master: {})",
                self.config.node_name,
                role,
                master.as_deref().unwrap_or("none")
            )));
        }
        Ok(WriteAdmission {
            epoch,
            _gate: gate,
        })
    }

    /// Ship a locally committed batch to the replicas and wait until enough
    /// voting members have acknowledged it.
    ///
    /// A replica that fails or times out is a missing acknowledgement, not
    /// a local fault: falling short is connection-scoped.
    pub async fn replicate(
        &self,
        admission: &WriteAdmission,
        sequence: u64,
        batch: &WriteBatch,
    ) -> FailureResult<()> {
        let (targets, voting_total) = {
            let members = self.members()?;
            let targets: Vec<NodeDescriptor> = members
                .values()
                .filter(|n| n.name != self.config.node_name && n.role == NodeRole::Replica)
                .cloned()
                .collect();
            let voting = members.values().filter(|n| n.is_voting()).count();
            (targets, voting)
        };
        let needed = match self.config.durability {
            Durability::Local => 0,
            Durability::Quorum => (voting_total / 2 + 1).saturating_sub(1),
        };

        let frame = ReplicationFrame {
            source: self.config.node_name.clone(),
            epoch: admission.epoch(),
            sequence,
            batch: batch.clone(),
        };
        let reachable_voters = targets.iter().filter(|n| n.is_voting()).count();

        let mut acks = FuturesUnordered::new();
        for target in targets {
            self.metrics.increment_frames_sent();
            let operation = self.transport.replicate(&target, &frame);
            let timeout = self.config.ack_timeout;
            acks.push(async move {
                let result = operation.wait(timeout).await;
                (target, result)
            });
        }

        if needed == 0 {
            return Ok(());
        }
        if reachable_voters < needed {
            return Err(Failure::connection_scoped(format!(
                "batch {} needs {} replica acknowledgements but only {} voting replicas are available",
                sequence, needed, reachable_voters
            )));
        }

        let mut received = 0;
        while let Some((target, result)) = acks.next().await {
            match result {
                Ok(()) => {
                    self.metrics.increment_acks();
                    if target.is_voting() {
                        received += 1;
                        if received >= needed {
                            return Ok(());
                        }
                    }
                }
                Err(failure) => {
                    self.metrics.increment_ack_failures();
                    tracing::warn!(
                        event = %Event::ReplicaAckFailed,
                        node = %target.name,
                        sequence,
                        error = %failure,
                        "replica did not acknowledge batch"
                    );
                }
            }
        }

        Err(Failure::connection_scoped(format!(
            "batch {} acknowledged by {} of {} required replicas",
            sequence, received, needed
        )))
    }

    /// Check a replication stream from `from` claiming `epoch`.
    ///
    /// Older epochs are fenced. A newer epoch installs `from` as master,
    /// demoting the local node if it was master. Two different masters
    /// claiming the same epoch is ambiguous and refused.
    pub async fn accept_replication(&self, from: &str, epoch: u64) -> FailureResult<()> {
        if from == self.config.node_name {
            return Err(Failure::validation("a node cannot replicate to itself"));
        }
        let sender = self.require_member(from)?;
        if sender.monitor {
            return Err(Failure::validation(format!(
                "monitor '{}' cannot act as master",
                from
            )));
        }

        let (role, current) = self.local.snapshot();
        if epoch < current {
            self.metrics.increment_stale_frames();
            tracing::warn!(
                event = %Event::StaleMasterFenced,
                from,
                epoch,
                current,
                "refused replication from superseded master"
            );
            return Err(Failure::connection_scoped(format!(
                "master '{}' epoch {} is superseded by epoch {}",
                from, epoch, current
            )));
        }

        if epoch == current {
            match self.current_master()?.as_deref() {
                Some(master) if master == from => {
                    if role != NodeRole::Unknown {
                        return Ok(());
                    }
                }
                Some(master) => {
                    self.metrics.increment_stale_frames();
                    tracing::warn!(
                        event = %Event::StaleMasterFenced,
                        from,
                        master,
                        epoch,
                        "two masters claim the same epoch"
                    );
                    return Err(Failure::connection_scoped(format!(
                        "epoch {} belongs to master '{}', refusing '{}'",
                        epoch, master, from
                    )));
                }
                None => {}
            }
        }

        self.install_master(from, epoch).await
    }

    /// Accept and durably apply a batch shipped by the master.
    pub async fn apply_replicated(&self, frame: &ReplicationFrame) -> FailureResult<u64> {
        self.accept_replication(&frame.source, frame.epoch).await?;
        let sequence = self.records.write_batch(&frame.batch)?;
        self.applied_batches.fetch_add(1, Ordering::AcqRel);
        self.metrics.increment_batches_applied();
        tracing::trace!(from = %frame.source, sequence = frame.sequence, "applied replicated batch");
        Ok(sequence)
    }

    /// The group elected `winner` under `epoch`.
    pub async fn on_election_result(&self, winner: &str, epoch: u64) -> FailureResult<()> {
        let node = self.require_member(winner)?;
        if node.monitor {
            return Err(Failure::validation(format!(
                "monitor '{}' cannot be elected master",
                winner
            )));
        }
        if node.role.is_terminal() {
            return Err(Failure::validation(format!(
                "detached node '{}' cannot be elected master",
                winner
            )));
        }
        let current = self.local.epoch();
        if epoch <= current {
            return Err(Failure::validation(format!(
                "election for epoch {} is not newer than epoch {}",
                epoch, current
            )));
        }
        self.install_master(winner, epoch).await
    }

    // =========================================================================
    // Master transfer
    // =========================================================================

    /// Validate `target` and ask the transport to make it master under the
    /// next epoch. Nothing changes locally until the returned operation is
    /// waited on and applied by [`transfer_master`](Self::transfer_master).
    pub fn transfer_master_asynchronously(&self, target: &str) -> FailureResult<PendingTransfer> {
        let node = {
            let members = self.members()?;
            validate_target(&members, target)?;
            members
                .get(target)
                .cloned()
                .ok_or_else(|| self.unknown_node(target))?
        };
        let epoch = self.local.epoch() + 1;
        Ok(PendingTransfer {
            target: node.name.clone(),
            epoch,
            operation: self.transport.transfer_master(&node, epoch),
        })
    }

    /// Transfer mastership to `target`, waiting at most `timeout`.
    ///
    /// Returns the new epoch. On any failure group roles are unchanged.
    pub async fn transfer_master(&self, target: &str, timeout: Duration) -> FailureResult<u64> {
        let ticket = self.transfers.begin(target)?;
        self.metrics.increment_transfers_requested();
        tracing::info!(event = %Event::TransferRequested, node = %target, "master transfer requested");

        let result = self.run_transfer(&ticket, target, timeout).await;
        match &result {
            Ok(epoch) => {
                if let Err(err) = ticket.succeed() {
                    tracing::warn!(error = %err, "transfer state out of step");
                }
                self.metrics.increment_transfers_succeeded();
                tracing::info!(event = %Event::TransferSucceeded, node = %target, epoch, "master transferred");
            }
            Err(failure) => {
                ticket.fail(failure.kind());
                self.metrics.increment_transfers_failed();
                if failure.is_fatal() {
                    tracing::error!(event = %Event::ServerScopedFailure, node = %target, error = %failure, "master transfer failed");
                } else {
                    tracing::warn!(event = %Event::TransferFailed, node = %target, error = %failure, "master transfer failed");
                }
            }
        }
        result
    }

    async fn run_transfer(
        &self,
        ticket: &TransferTicket<'_>,
        target: &str,
        timeout: Duration,
    ) -> FailureResult<u64> {
        let pending = self.transfer_master_asynchronously(target)?;
        ticket.dispatch(pending.epoch)?;
        pending.operation.wait(timeout).await?;
        self.install_master(&pending.target, pending.epoch).await?;
        Ok(pending.epoch)
    }
}

impl std::fmt::Debug for ReplicationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (role, epoch) = self.local.snapshot();
        f.debug_struct("ReplicationGroup")
            .field("group", &self.config.group_name)
            .field("node", &self.config.node_name)
            .field("role", &role)
            .field("epoch", &epoch)
            .finish()
    }
}
