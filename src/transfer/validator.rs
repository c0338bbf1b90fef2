//! Transfer target validation
//!
//! Deterministic and side-effect free. Runs before the transport is asked
//! to do anything.

use std::collections::BTreeMap;

use crate::failure::{Failure, FailureResult};
use crate::replication::{NodeDescriptor, NodeRole};

/// Why a transfer target was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDenial {
    /// The target is not a member of the group.
    UnknownNode,
    /// Monitors never hold mastership.
    Monitor,
    /// The target is master already.
    AlreadyMaster,
    /// The target holds a role other than REPLICA.
    NotReplica(NodeRole),
}

impl TransferDenial {
    pub fn description(&self) -> String {
        match self {
            Self::UnknownNode => "node is not a member of the group".to_string(),
            Self::Monitor => "monitor nodes cannot become master".to_string(),
            Self::AlreadyMaster => "node is already master".to_string(),
            Self::NotReplica(role) => format!("node is {}, only a REPLICA can become master", role),
        }
    }
}

/// Check that `target` may become master.
pub fn check_target(
    members: &BTreeMap<String, NodeDescriptor>,
    target: &str,
) -> Result<(), TransferDenial> {
    let node = members.get(target).ok_or(TransferDenial::UnknownNode)?;
    if node.monitor {
        return Err(TransferDenial::Monitor);
    }
    match node.role {
        NodeRole::Replica => Ok(()),
        NodeRole::Master => Err(TransferDenial::AlreadyMaster),
        other => Err(TransferDenial::NotReplica(other)),
    }
}

/// [`check_target`] as a validation failure.
pub fn validate_target(
    members: &BTreeMap<String, NodeDescriptor>,
    target: &str,
) -> FailureResult<()> {
    check_target(members, target).map_err(|denial| {
        Failure::validation(format!(
            "cannot transfer master to '{}': {}",
            target,
            denial.description()
        ))
    })
}
