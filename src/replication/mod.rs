//! Replication group
//!
//! - Exactly one MASTER per epoch; only the master admits writes
//! - Replicas apply batches shipped by the master and never originate them
//! - Epochs fence stale masters
//! - Monitors receive traffic but never vote and never become master
//!
//! The transport is a trait seam; [`LoopbackTransport`] connects groups in
//! one process and scripts failures for tests.

mod config;
mod group;
mod loopback;
mod node;
mod role;
mod transport;

pub use config::{Durability, HelperNode, ReplicationConfig};
pub use group::{PendingTransfer, ReplicationGroup, RoleSnapshot, WriteAdmission};
pub use loopback::{LoopbackOutcome, LoopbackTransport, RemovalOutcome, TransportCall};
pub use node::{validate_node_name, NodeDescriptor};
pub use role::{NodeRole, RoleCell};
pub(crate) use node::{EPOCH_KEY, NODE_PREFIX};
pub use transport::{
    Completion, PendingOperation, ReplicationFrame, ReplicationTransport, TransportError,
};
