//! Authorization decisions
//!
//! ## Invariants
//! - Checked before any state is read for the operation or written
//! - No silent bypass: only service principals skip the rules
//! - Rules are evaluated in order; the first match decides; no match denies

use serde::{Deserialize, Serialize};

use super::principal::{ObjectKind, ObjectRef, Principal};
use crate::failure::{Failure, FailureResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

/// Authorization seam for mutating administration calls.
pub trait AccessControl: Send + Sync {
    fn decide(&self, principal: &Principal, operation: Operation, object: &ObjectRef) -> Decision;

    fn authorise(
        &self,
        principal: &Principal,
        operation: Operation,
        object: &ObjectRef,
    ) -> FailureResult<()> {
        if principal.is_service {
            return Ok(());
        }
        match self.decide(principal, operation, object) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(Failure::access_denied(format!(
                "'{}' may not {} {}",
                principal,
                operation.as_str(),
                object
            ))),
        }
    }

    fn authorise_update(&self, principal: &Principal, object: &ObjectRef) -> FailureResult<()> {
        self.authorise(principal, Operation::Update, object)
    }

    fn authorise_delete(&self, principal: &Principal, object: &ObjectRef) -> FailureResult<()> {
        self.authorise(principal, Operation::Delete, object)
    }
}

/// Permits everything. Single-node and test setups.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn decide(&self, _: &Principal, _: Operation, _: &ObjectRef) -> Decision {
        Decision::Allow
    }
}

/// Who a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Any,
    User { name: String },
    Group { name: String },
}

impl Subject {
    fn matches(&self, principal: &Principal) -> bool {
        match self {
            Subject::Any => true,
            Subject::User { name } => principal.name == *name,
            Subject::Group { name } => principal.in_group(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub subject: Subject,

    /// `None` matches every operation.
    #[serde(default)]
    pub operation: Option<Operation>,

    /// `None` matches every object kind.
    #[serde(default)]
    pub object: Option<ObjectKind>,

    pub decision: Decision,
}

impl AclRule {
    fn matches(&self, principal: &Principal, operation: Operation, object: &ObjectRef) -> bool {
        self.subject.matches(principal)
            && self.operation.map_or(true, |op| op == operation)
            && self.object.map_or(true, |kind| kind == object.kind)
    }
}

/// Ordered rule list, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRules {
    #[serde(default)]
    rules: Vec<AclRule>,
}

impl AclRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: AclRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Allow `operation` on every object to members of `group`.
    pub fn allow_group(self, group: impl Into<String>, operation: Operation) -> Self {
        self.with_rule(AclRule {
            subject: Subject::Group { name: group.into() },
            operation: Some(operation),
            object: None,
            decision: Decision::Allow,
        })
    }

    pub fn from_json(json: &str) -> FailureResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| Failure::validation(format!("invalid access rules: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl AccessControl for AclRules {
    fn decide(&self, principal: &Principal, operation: Operation, object: &ObjectRef) -> Decision {
        self.rules
            .iter()
            .find(|rule| rule.matches(principal, operation, object))
            .map(|rule| rule.decision)
            .unwrap_or(Decision::Deny)
    }
}
