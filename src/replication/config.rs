//! Replication configuration
//!
//! Built from the node configuration file at startup and immutable after.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::node::{validate_node_name, NodeDescriptor};
use crate::failure::{Failure, FailureResult};

/// When a commit is considered durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Local write only; replicas catch up asynchronously.
    Local,
    /// Local write plus acknowledgement from a majority of voting members.
    Quorum,
}

impl Default for Durability {
    fn default() -> Self {
        Durability::Quorum
    }
}

/// A peer named in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperNode {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub monitor: bool,
}

impl HelperNode {
    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            monitor: self.monitor,
            ..NodeDescriptor::new(&self.name, &self.address)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    pub group_name: String,
    pub node_name: String,
    pub node_address: String,
    /// The local node is a monitor.
    pub monitor: bool,
    pub helpers: Vec<HelperNode>,
    pub durability: Durability,
    /// Upper bound on waiting for a master transfer to complete.
    pub transfer_timeout: Duration,
    /// Upper bound on waiting for a single replica acknowledgement.
    pub ack_timeout: Duration,
}

impl ReplicationConfig {
    /// Single node, no helpers, defaults everywhere else.
    pub fn standalone(node_name: impl Into<String>, node_address: impl Into<String>) -> Self {
        Self {
            group_name: "default".to_string(),
            node_name: node_name.into(),
            node_address: node_address.into(),
            monitor: false,
            helpers: Vec::new(),
            durability: Durability::default(),
            transfer_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_helper(mut self, helper: HelperNode) -> Self {
        self.helpers.push(helper);
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Descriptor for the local node as it is first recorded.
    pub fn local_descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            monitor: self.monitor,
            ..NodeDescriptor::new(&self.node_name, &self.node_address)
        }
    }

    pub fn validate(&self) -> FailureResult<()> {
        if self.group_name.trim().is_empty() {
            return Err(Failure::validation("group name must not be empty"));
        }
        self.local_descriptor().validate()?;

        let mut seen = HashSet::new();
        seen.insert(self.node_name.as_str());
        for helper in &self.helpers {
            validate_node_name(&helper.name)?;
            helper.descriptor().validate()?;
            if !seen.insert(helper.name.as_str()) {
                return Err(Failure::validation(format!(
                    "helper node '{}' is listed twice or shadows the local node",
                    helper.name
                )));
            }
        }

        if self.transfer_timeout.is_zero() {
            return Err(Failure::validation("transfer timeout must be positive"));
        }
        if self.ack_timeout.is_zero() {
            return Err(Failure::validation("replication ack timeout must be positive"));
        }
        Ok(())
    }
}
