//! Group member descriptors
//!
//! One configuration record per member lives under `cfg/node/<name>`.

use serde::{Deserialize, Serialize};

use super::role::NodeRole;
use crate::failure::{Failure, FailureResult};

pub(crate) const NODE_PREFIX: &str = "cfg/node/";
pub(crate) const EPOCH_KEY: &str = "cfg/group/epoch";

pub(crate) fn node_key(name: &str) -> String {
    format!("{}{}", NODE_PREFIX, name)
}

/// A member of the replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique within the group.
    pub name: String,
    /// Transport endpoint, `host:port`.
    pub address: String,
    /// Last role this node learned for the member.
    pub role: NodeRole,
    /// Monitors receive replication traffic but never vote or win elections.
    #[serde(default)]
    pub monitor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shared secret presented to the transport. Never shown on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_secret: Option<String>,
}

impl NodeDescriptor {
    /// A member that has not yet been contacted.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            role: NodeRole::Unknown,
            monitor: false,
            description: None,
            transport_secret: None,
        }
    }

    pub fn monitor(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            monitor: true,
            ..Self::new(name, address)
        }
    }

    /// Counts toward quorum and may be elected.
    pub fn is_voting(&self) -> bool {
        !self.monitor && self.role != NodeRole::Detached
    }

    pub fn validate(&self) -> FailureResult<()> {
        validate_node_name(&self.name)?;
        if self.address.trim().is_empty() {
            return Err(Failure::validation(format!(
                "node '{}' has an empty address",
                self.name
            )));
        }
        Ok(())
    }

    pub(crate) fn encode(&self) -> FailureResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Failure::server_scoped(format!("failed to encode node record '{}'", self.name))
                .with_source(e)
        })
    }

    pub(crate) fn decode(bytes: &[u8]) -> FailureResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Failure::server_scoped("corrupt node record").with_source(e))
    }
}

/// Node names become key segments.
pub fn validate_node_name(name: &str) -> FailureResult<()> {
    if name.trim().is_empty() {
        return Err(Failure::validation("node name must not be empty"));
    }
    if name.contains('/') {
        return Err(Failure::validation(format!(
            "node name '{}' must not contain '/'",
            name
        )));
    }
    Ok(())
}
