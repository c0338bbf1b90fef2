//! Acting principals and the objects they act on

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity carried by every administration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,

    /// Group memberships, matched by group rules.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Internal callers (recovery, the election machinery) bypass checks.
    #[serde(default)]
    pub is_service: bool,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            is_service: false,
        }
    }

    pub fn service() -> Self {
        Self {
            name: "system".to_string(),
            groups: Vec::new(),
            is_service: true,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    ReplicationNode,
    ReplicationGroup,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ReplicationNode => "replication_node",
            ObjectKind::ReplicationGroup => "replication_group",
        }
    }
}

/// A configured object an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectRef {
    pub fn replication_node(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::ReplicationNode,
            name: name.into(),
        }
    }

    pub fn replication_group(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::ReplicationGroup,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind.as_str(), self.name)
    }
}
