//! Cluster administration
//!
//! ## Order of checks for every mutating call
//! 1. Authorization, before anything about the target is read
//! 2. Request validation
//! 3. The group operation
//! 4. Audit record, whatever the outcome
//!
//! ## Invariants
//! - A denied call changes nothing and reads no node state
//! - `MASTER` is the only role a caller may request
//! - Failures from the group are returned exactly as classified there

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::attributes::{self, node_attributes, replication_node_schema, AttributeSchema};
use crate::failure::{Failure, FailureResult};
use crate::observability::{AuditAction, AuditLog, AuditOutcome, AuditRecord, Event, MetricsRegistry};
use crate::replication::{NodeDescriptor, NodeRole, ReplicationGroup};
use crate::security::{AccessControl, ObjectRef, Principal};

pub struct ClusterAdmin {
    group: Arc<ReplicationGroup>,
    access: Arc<dyn AccessControl>,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<MetricsRegistry>,
    schema: AttributeSchema,
}

impl ClusterAdmin {
    pub fn new(
        group: Arc<ReplicationGroup>,
        access: Arc<dyn AccessControl>,
        audit: Arc<dyn AuditLog>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            group,
            access,
            audit,
            metrics,
            schema: replication_node_schema(),
        }
    }

    pub fn group(&self) -> &Arc<ReplicationGroup> {
        &self.group
    }

    /// Handle on one member, for attribute-style administration.
    pub fn node(&self, name: impl Into<String>) -> ReplicationNode<'_> {
        ReplicationNode {
            admin: self,
            name: name.into(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Role of the local node.
    pub fn local_role(&self) -> NodeRole {
        self.group.local_role()
    }

    pub fn get_role(&self, node: &str) -> FailureResult<NodeRole> {
        self.group.get_role(node)
    }

    /// Members ordered by name.
    pub fn list_members(&self) -> FailureResult<Vec<NodeDescriptor>> {
        self.group.list_members()
    }

    /// Attributes of `node` as a caller may see them.
    pub fn attributes(&self, node: &str) -> FailureResult<Map<String, Value>> {
        let descriptor = self
            .group
            .member(node)?
            .ok_or_else(|| Failure::validation(format!("node '{}' is not a member", node)))?;
        Ok(self
            .schema
            .redact(&node_attributes(&descriptor, self.group.epoch())))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn authorise_update(&self, principal: &Principal, object: &ObjectRef) -> FailureResult<()> {
        self.access
            .authorise_update(principal, object)
            .inspect_err(|failure| self.denied(principal, object, failure))
    }

    fn authorise_delete(&self, principal: &Principal, object: &ObjectRef) -> FailureResult<()> {
        self.access
            .authorise_delete(principal, object)
            .inspect_err(|failure| self.denied(principal, object, failure))
    }

    fn denied(&self, principal: &Principal, object: &ObjectRef, failure: &Failure) {
        self.metrics.increment_access_denied();
        tracing::warn!(
            event = %Event::AccessDenied,
            principal = %principal,
            object = %object,
            error = %failure,
            "administration request denied"
        );
    }

    fn record<T>(
        &self,
        principal: &Principal,
        action: AuditAction,
        target: &str,
        result: &FailureResult<T>,
    ) {
        let mut record = AuditRecord::new(&principal.name, action, target, AuditOutcome::of(result));
        if let Err(failure) = result {
            record = record.with_error(failure.to_string());
        }
        if let Err(err) = self.audit.append(&record) {
            tracing::error!(error = %err, action = %action, node = %target, "failed to append audit record");
        }
    }

    /// Ask for `node` to hold `desired`. Only `MASTER` may be requested; it
    /// transfers mastership and returns the new epoch.
    pub async fn request_role_change(
        &self,
        principal: &Principal,
        node: &str,
        desired: NodeRole,
    ) -> FailureResult<u64> {
        let result = self.role_change(principal, node, desired).await;
        self.record(principal, AuditAction::RoleChange, node, &result);
        result
    }

    async fn role_change(
        &self,
        principal: &Principal,
        node: &str,
        desired: NodeRole,
    ) -> FailureResult<u64> {
        self.authorise_update(principal, &ObjectRef::replication_node(node))?;
        if desired != NodeRole::Master {
            return Err(Failure::validation(format!(
                "role {} cannot be requested; only {} is a legal target",
                desired,
                NodeRole::Master
            )));
        }
        self.group
            .transfer_master(node, self.group.config().transfer_timeout)
            .await
    }

    /// Remove `node` from the group. `false` if the group did not know it.
    pub async fn remove_node_from_group(
        &self,
        principal: &Principal,
        node: &str,
    ) -> FailureResult<bool> {
        let result = match self.authorise_delete(principal, &ObjectRef::replication_node(node)) {
            Ok(()) => self.group.remove_node_from_group(node).await,
            Err(denied) => Err(denied),
        };
        self.record(principal, AuditAction::RemoveNode, node, &result);
        result
    }

    /// Add a member described by creation attributes.
    pub async fn join_node(
        &self,
        principal: &Principal,
        attributes: &Map<String, Value>,
    ) -> FailureResult<NodeDescriptor> {
        let target = attributes
            .get(attributes::NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let result = self.join(principal, attributes).await;
        self.record(principal, AuditAction::JoinNode, &target, &result);
        result
    }

    async fn join(
        &self,
        principal: &Principal,
        attributes: &Map<String, Value>,
    ) -> FailureResult<NodeDescriptor> {
        let group = ObjectRef::replication_group(&self.group.config().group_name);
        self.authorise_update(principal, &group)?;
        let resolved = self.schema.validate_create(attributes)?;
        let node = attributes::node_from_attributes(&resolved)?;
        self.group.join_group(node).await
    }

    /// Change attributes of `node`. Setting `role` to `MASTER` transfers
    /// mastership; the other changes are stored only if it succeeds.
    pub async fn set_attributes(
        &self,
        principal: &Principal,
        node: &str,
        changes: &Map<String, Value>,
    ) -> FailureResult<Map<String, Value>> {
        let result = self.update_attributes(principal, node, changes).await;
        self.record(principal, AuditAction::UpdateAttributes, node, &result);
        result
    }

    async fn update_attributes(
        &self,
        principal: &Principal,
        node: &str,
        changes: &Map<String, Value>,
    ) -> FailureResult<Map<String, Value>> {
        self.authorise_update(principal, &ObjectRef::replication_node(node))?;
        let current = self
            .group
            .member(node)?
            .ok_or_else(|| Failure::validation(format!("node '{}' is not a member", node)))?;
        let effective = self
            .schema
            .validate_update(&node_attributes(&current, self.group.epoch()), changes)?;

        let settings: Map<String, Value> = effective
            .iter()
            .filter(|(name, _)| name.as_str() != attributes::ROLE)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut updated = current.clone();
        attributes::apply_settings(&mut updated, &settings)?;

        // Settings are stored only once a requested transfer has succeeded.
        if effective.contains_key(attributes::ROLE) {
            self.group
                .transfer_master(node, self.group.config().transfer_timeout)
                .await?;
        }
        if !settings.is_empty() {
            self.group.update_member(node, |member| {
                member.description = updated.description;
                member.transport_secret = updated.transport_secret;
            })?;
        }
        self.attributes(node)
    }
}

impl std::fmt::Debug for ClusterAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAdmin")
            .field("group", &self.group)
            .finish()
    }
}

/// One member of the group, seen as a configured object.
#[derive(Debug)]
pub struct ReplicationNode<'a> {
    admin: &'a ClusterAdmin,
    name: String,
}

impl ReplicationNode<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> FailureResult<NodeRole> {
        self.admin.get_role(&self.name)
    }

    pub fn attributes(&self) -> FailureResult<Map<String, Value>> {
        self.admin.attributes(&self.name)
    }

    pub async fn set_attributes(
        &self,
        principal: &Principal,
        changes: &Map<String, Value>,
    ) -> FailureResult<Map<String, Value>> {
        self.admin.set_attributes(principal, &self.name, changes).await
    }

    /// Remove the node from the group.
    pub async fn delete(&self, principal: &Principal) -> FailureResult<()> {
        if self.admin.remove_node_from_group(principal, &self.name).await? {
            Ok(())
        } else {
            Err(Failure::validation(format!(
                "node '{}' was not found by the group transport",
                self.name
            )))
        }
    }
}
