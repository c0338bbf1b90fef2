//! Node role state machine
//!
//! Roles:
//! - Unknown: before group contact, or after contact with the group is lost
//! - Replica: steady state, follows the master
//! - Master: sole write authority for the current epoch
//! - Detached: removed or permanently failed; terminal for the membership
//!
//! The local node's role and the group epoch are published through a
//! [`RoleCell`] so any thread can take a consistent snapshot without locking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::failure::{Failure, FailureResult};

/// Role of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    Unknown,
    Replica,
    Master,
    Detached,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Unknown => "UNKNOWN",
            NodeRole::Replica => "REPLICA",
            NodeRole::Master => "MASTER",
            NodeRole::Detached => "DETACHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(NodeRole::Unknown),
            "REPLICA" => Some(NodeRole::Replica),
            "MASTER" => Some(NodeRole::Master),
            "DETACHED" => Some(NodeRole::Detached),
            _ => None,
        }
    }

    /// Only the master accepts local write transactions.
    pub fn can_write(&self) -> bool {
        matches!(self, NodeRole::Master)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeRole::Detached)
    }

    /// Check that `self → to` is a legal transition.
    ///
    /// Same-role transitions are idempotent. Detached is terminal.
    pub fn check_transition(self, to: NodeRole) -> FailureResult<()> {
        if self == to {
            return Ok(());
        }
        match (self, to) {
            (NodeRole::Detached, _) => Err(Failure::validation(format!(
                "illegal role transition {} -> {}: detached is terminal",
                self, to
            ))),
            (_, NodeRole::Unknown)
            | (_, NodeRole::Replica)
            | (_, NodeRole::Master)
            | (_, NodeRole::Detached) => Ok(()),
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            NodeRole::Unknown => 0,
            NodeRole::Replica => 1,
            NodeRole::Master => 2,
            NodeRole::Detached => 3,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits & ROLE_MASK {
            1 => NodeRole::Replica,
            2 => NodeRole::Master,
            3 => NodeRole::Detached,
            _ => NodeRole::Unknown,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ROLE_BITS: u32 = 8;
const ROLE_MASK: u64 = (1 << ROLE_BITS) - 1;

/// Lock-free (role, epoch) pair for the local node.
///
/// Both values live in one word so a snapshot never mixes a role from one
/// epoch with another epoch.
#[derive(Debug)]
pub struct RoleCell {
    packed: AtomicU64,
}

impl RoleCell {
    pub fn new(role: NodeRole, epoch: u64) -> Self {
        Self {
            packed: AtomicU64::new(Self::pack(role, epoch)),
        }
    }

    fn pack(role: NodeRole, epoch: u64) -> u64 {
        (epoch << ROLE_BITS) | role.to_bits()
    }

    pub fn snapshot(&self) -> (NodeRole, u64) {
        let packed = self.packed.load(Ordering::Acquire);
        (NodeRole::from_bits(packed), packed >> ROLE_BITS)
    }

    pub fn role(&self) -> NodeRole {
        self.snapshot().0
    }

    pub fn epoch(&self) -> u64 {
        self.snapshot().1
    }

    pub(crate) fn store(&self, role: NodeRole, epoch: u64) {
        self.packed.store(Self::pack(role, epoch), Ordering::Release);
    }
}
