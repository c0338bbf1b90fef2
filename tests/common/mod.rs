//! Shared fixtures: replication groups over in-memory record stores,
//! connected by one loopback transport.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mqstore::admin::ClusterAdmin;
use mqstore::observability::{MemoryAuditLog, MetricsRegistry};
use mqstore::replication::{
    Durability, HelperNode, LoopbackTransport, NodeRole, ReplicationConfig, ReplicationGroup,
};
use mqstore::security::AccessControl;
use mqstore::storage::MemoryRecordStore;
use mqstore::store::MessageStore;

pub const ACK_TIMEOUT: Duration = Duration::from_millis(200);
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(500);

pub struct TestNode {
    pub records: Arc<MemoryRecordStore>,
    pub group: Arc<ReplicationGroup>,
    pub metrics: Arc<MetricsRegistry>,
}

impl TestNode {
    pub fn open_store(&self) -> Arc<MessageStore> {
        MessageStore::open(
            self.records.clone(),
            self.group.clone(),
            self.metrics.clone(),
        )
        .unwrap()
    }

    pub fn admin(&self, access: Arc<dyn AccessControl>) -> (ClusterAdmin, Arc<MemoryAuditLog>) {
        let audit = Arc::new(MemoryAuditLog::new());
        let admin = ClusterAdmin::new(
            self.group.clone(),
            access,
            audit.clone(),
            self.metrics.clone(),
        );
        (admin, audit)
    }
}

pub fn config(name: &str, peers: &[&str], durability: Durability) -> ReplicationConfig {
    let mut config = ReplicationConfig::standalone(name, format!("{}:5000", name))
        .with_durability(durability)
        .with_transfer_timeout(TRANSFER_TIMEOUT)
        .with_ack_timeout(ACK_TIMEOUT);
    for peer in peers {
        config = config.with_helper(HelperNode {
            name: peer.to_string(),
            address: format!("{}:5000", peer),
            monitor: false,
        });
    }
    config
}

/// Open (not start) a node over `records` and connect it to `transport`.
pub fn open_node_over(
    records: Arc<MemoryRecordStore>,
    config: ReplicationConfig,
    transport: &Arc<LoopbackTransport>,
) -> TestNode {
    let metrics = Arc::new(MetricsRegistry::new());
    let group = Arc::new(
        ReplicationGroup::open(config, records.clone(), transport.clone(), metrics.clone())
            .unwrap(),
    );
    transport.connect_peer(&group);
    TestNode {
        records,
        group,
        metrics,
    }
}

pub fn open_node(
    name: &str,
    peers: &[&str],
    durability: Durability,
    transport: &Arc<LoopbackTransport>,
) -> TestNode {
    open_node_over(
        Arc::new(MemoryRecordStore::new()),
        config(name, peers, durability),
        transport,
    )
}

/// A started single-member group: master under epoch 1.
pub async fn standalone(name: &str) -> (TestNode, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let node = open_node(name, &[], Durability::Quorum, &transport);
    node.group.start().await.unwrap();
    (node, transport)
}

/// A group in which only the local node runs in this process. Peers are
/// not connected, so every transport call to them succeeds unless
/// scripted. The local node is master under epoch 1, elected or sole.
pub async fn master_with_peers(name: &str, peers: &[&str]) -> (TestNode, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let node = open_node(name, peers, Durability::Quorum, &transport);
    node.group.start().await.unwrap();
    if node.group.local_role() != NodeRole::Master {
        node.group.on_election_result(name, 1).await.unwrap();
    }
    (node, transport)
}

/// Every member runs in this process and shares one transport. The first
/// is master under epoch 1; the others learn it from the first batch they
/// receive.
pub async fn cluster(
    names: &[&str],
    durability: Durability,
) -> (Vec<TestNode>, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let nodes: Vec<TestNode> = names
        .iter()
        .map(|name| {
            let peers: Vec<&str> = names.iter().copied().filter(|p| p != name).collect();
            open_node(name, &peers, durability, &transport)
        })
        .collect();
    for node in &nodes {
        node.group.start().await.unwrap();
    }
    nodes[0].group.on_election_result(names[0], 1).await.unwrap();
    (nodes, transport)
}
