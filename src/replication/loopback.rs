//! In-process transport
//!
//! Connects groups living in the same process and lets callers script the
//! outcome of every operation. A node with no connected peers behaves as a
//! single-member group whose contacts always succeed.
//!
//! Unscripted behaviour:
//! - `contact`: succeeds immediately
//! - `transfer_master`: tells the connected target it won, else succeeds
//! - `replicate`: applies the frame on the connected target, else succeeds
//! - `remove_node`: reports the node as removed

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::group::ReplicationGroup;
use super::node::NodeDescriptor;
use super::transport::{
    Completion, PendingOperation, ReplicationFrame, ReplicationTransport, TransportError,
};
use crate::failure::Failure;

/// How a scripted operation completes.
#[derive(Debug, Clone)]
pub enum LoopbackOutcome {
    Succeed,
    /// Complete with this failure as the transport error.
    Fail(Failure),
    /// Complete with an opaque I/O error.
    FailOpaque(String),
    /// Never complete. The completion is retained, see [`LoopbackTransport::release_hung`].
    Hang,
    /// Drop the completion without an outcome.
    Abandon,
    /// Succeed after the delay.
    Delay(Duration),
}

/// Scripted outcome of `remove_node`.
#[derive(Debug, Clone)]
pub enum RemovalOutcome {
    Removed,
    NotFound,
    Fail(Failure),
    FailOpaque(String),
}

/// A call made through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Contact { node: String },
    TransferMaster { target: String, epoch: u64 },
    Replicate { target: String, epoch: u64, sequence: u64 },
    RemoveNode { node: String },
}

#[derive(Default)]
struct Script {
    contact: HashMap<String, LoopbackOutcome>,
    transfer: VecDeque<LoopbackOutcome>,
    replicate: HashMap<String, LoopbackOutcome>,
    remove: VecDeque<RemovalOutcome>,
}

#[derive(Default)]
pub struct LoopbackTransport {
    script: Mutex<Script>,
    peers: Mutex<HashMap<String, Weak<ReplicationGroup>>>,
    calls: Mutex<Vec<TransportCall>>,
    hung: Mutex<Vec<Completion>>,
}

// Test tooling: a panic while holding one of these locks leaves plain data behind.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn opaque(message: &str) -> TransportError {
    Box::new(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route traffic for `group`'s local node to `group`.
    pub fn connect_peer(&self, group: &Arc<ReplicationGroup>) {
        relock(&self.peers).insert(group.local_name().to_string(), Arc::downgrade(group));
    }

    pub fn script_contact(&self, node: &str, outcome: LoopbackOutcome) {
        relock(&self.script).contact.insert(node.to_string(), outcome);
    }

    /// Outcome of the next `transfer_master` call. Queued, one per call.
    pub fn script_transfer(&self, outcome: LoopbackOutcome) {
        relock(&self.script).transfer.push_back(outcome);
    }

    /// Outcome of every `replicate` to `target` until cleared.
    pub fn script_replicate(&self, target: &str, outcome: LoopbackOutcome) {
        relock(&self.script).replicate.insert(target.to_string(), outcome);
    }

    pub fn clear_replicate(&self, target: &str) {
        relock(&self.script).replicate.remove(target);
    }

    /// Outcome of the next `remove_node` call. Queued, one per call.
    pub fn script_remove(&self, outcome: RemovalOutcome) {
        relock(&self.script).remove.push_back(outcome);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        relock(&self.calls).clone()
    }

    /// Complete every hung operation successfully.
    pub fn release_hung(&self) -> usize {
        let hung = std::mem::take(&mut *relock(&self.hung));
        let count = hung.len();
        for completion in hung {
            completion.succeed(());
        }
        count
    }

    fn record(&self, call: TransportCall) {
        relock(&self.calls).push(call);
    }

    fn peer(&self, name: &str) -> Option<Option<Arc<ReplicationGroup>>> {
        relock(&self.peers).get(name).map(Weak::upgrade)
    }

    fn settle(&self, description: String, outcome: LoopbackOutcome) -> PendingOperation {
        let (completion, pending) = PendingOperation::channel(description);
        match outcome {
            LoopbackOutcome::Succeed => {
                completion.succeed(());
            }
            LoopbackOutcome::Fail(failure) => {
                completion.fail(failure);
            }
            LoopbackOutcome::FailOpaque(message) => {
                completion.complete(Err(opaque(&message)));
            }
            LoopbackOutcome::Hang => relock(&self.hung).push(completion),
            LoopbackOutcome::Abandon => drop(completion),
            LoopbackOutcome::Delay(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    completion.succeed(());
                });
            }
        }
        pending
    }

    fn unreachable(&self, description: String, name: &str) -> PendingOperation {
        self.settle(
            description,
            LoopbackOutcome::Fail(Failure::connection_scoped(format!(
                "peer '{}' is unreachable",
                name
            ))),
        )
    }
}

impl ReplicationTransport for LoopbackTransport {
    fn contact(&self, node: &NodeDescriptor) -> PendingOperation {
        self.record(TransportCall::Contact {
            node: node.name.clone(),
        });
        let outcome = relock(&self.script)
            .contact
            .get(&node.name)
            .cloned()
            .unwrap_or(LoopbackOutcome::Succeed);
        self.settle(format!("contact node '{}'", node.name), outcome)
    }

    fn transfer_master(&self, target: &NodeDescriptor, epoch: u64) -> PendingOperation {
        self.record(TransportCall::TransferMaster {
            target: target.name.clone(),
            epoch,
        });
        let description = format!("transfer master to '{}'", target.name);
        if let Some(outcome) = relock(&self.script).transfer.pop_front() {
            return self.settle(description, outcome);
        }

        match self.peer(&target.name) {
            None => self.settle(description, LoopbackOutcome::Succeed),
            Some(None) => self.unreachable(description, &target.name),
            Some(Some(peer)) => {
                let (completion, pending) = PendingOperation::channel(description);
                let winner = target.name.clone();
                tokio::spawn(async move {
                    let result = peer
                        .on_election_result(&winner, epoch)
                        .await
                        .map_err(|failure| Box::new(failure) as TransportError);
                    completion.complete(result);
                });
                pending
            }
        }
    }

    fn replicate(&self, target: &NodeDescriptor, frame: &ReplicationFrame) -> PendingOperation {
        self.record(TransportCall::Replicate {
            target: target.name.clone(),
            epoch: frame.epoch,
            sequence: frame.sequence,
        });
        let description = format!("replicate batch {} to '{}'", frame.sequence, target.name);
        let scripted = relock(&self.script).replicate.get(&target.name).cloned();
        if let Some(outcome) = scripted {
            return self.settle(description, outcome);
        }

        match self.peer(&target.name) {
            None => self.settle(description, LoopbackOutcome::Succeed),
            Some(None) => self.unreachable(description, &target.name),
            Some(Some(peer)) => {
                let (completion, pending) = PendingOperation::channel(description);
                let frame = frame.clone();
                tokio::spawn(async move {
                    let result = peer
                        .apply_replicated(&frame)
                        .await
                        .map(|_| ())
                        .map_err(|failure| Box::new(failure) as TransportError);
                    completion.complete(result);
                });
                pending
            }
        }
    }

    fn remove_node(&self, name: &str) -> Result<bool, TransportError> {
        self.record(TransportCall::RemoveNode {
            node: name.to_string(),
        });
        let outcome = relock(&self.script)
            .remove
            .pop_front()
            .unwrap_or(RemovalOutcome::Removed);
        match outcome {
            RemovalOutcome::Removed => Ok(true),
            RemovalOutcome::NotFound => Ok(false),
            RemovalOutcome::Fail(failure) => Err(Box::new(failure)),
            RemovalOutcome::FailOpaque(message) => Err(opaque(&message)),
        }
    }
}
