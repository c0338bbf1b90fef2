//! Replication node attributes

use serde_json::{json, Map, Value};

use super::schema::AttributeSchema;
use super::types::{AttributeSpec, AttributeType, Mutability};
use crate::failure::{Failure, FailureResult};
use crate::replication::{NodeDescriptor, NodeRole};

pub const NAME: &str = "name";
pub const ADDRESS: &str = "address";
pub const MONITOR: &str = "monitor";
pub const ROLE: &str = "role";
pub const DESCRIPTION: &str = "description";
pub const TRANSPORT_SECRET: &str = "transport_secret";
pub const LAST_KNOWN_EPOCH: &str = "last_known_epoch";

/// Schema of a replication node object.
///
/// `role` may only be written as `MASTER`: that is a request to transfer
/// mastership to the node. Every other role is reached by the group itself.
pub fn replication_node_schema() -> AttributeSchema {
    AttributeSchema::new("replication node")
        .with(AttributeSpec::new(NAME, AttributeType::String, Mutability::ImmutableAfterSet).required())
        .with(
            AttributeSpec::new(ADDRESS, AttributeType::String, Mutability::ImmutableAfterSet)
                .required(),
        )
        .with(
            AttributeSpec::new(MONITOR, AttributeType::Bool, Mutability::ImmutableAfterSet)
                .with_default(json!(false)),
        )
        .with(
            AttributeSpec::new(ROLE, AttributeType::String, Mutability::Mutable)
                .allowing([json!(NodeRole::Master.as_str())]),
        )
        .with(AttributeSpec::new(DESCRIPTION, AttributeType::String, Mutability::Mutable))
        .with(AttributeSpec::new(
            TRANSPORT_SECRET,
            AttributeType::String,
            Mutability::Secure,
        ))
        .with(AttributeSpec::new(
            LAST_KNOWN_EPOCH,
            AttributeType::Int,
            Mutability::Derived,
        ))
}

/// Current attribute values of `node`, unredacted.
pub fn node_attributes(node: &NodeDescriptor, epoch: u64) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(NAME.to_string(), json!(node.name));
    map.insert(ADDRESS.to_string(), json!(node.address));
    map.insert(MONITOR.to_string(), json!(node.monitor));
    map.insert(ROLE.to_string(), json!(node.role.as_str()));
    map.insert(
        DESCRIPTION.to_string(),
        node.description.as_ref().map_or(Value::Null, |d| json!(d)),
    );
    map.insert(
        TRANSPORT_SECRET.to_string(),
        node.transport_secret.as_ref().map_or(Value::Null, |s| json!(s)),
    );
    map.insert(LAST_KNOWN_EPOCH.to_string(), json!(epoch));
    map
}

fn optional_string(value: &Value) -> FailureResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(Failure::validation(format!("expected string, got {}", other))),
    }
}

/// Build a node descriptor from creation attributes already validated by
/// [`replication_node_schema`].
pub fn node_from_attributes(attributes: &Map<String, Value>) -> FailureResult<NodeDescriptor> {
    let text = |key: &str| {
        attributes
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Failure::validation(format!("replication node attribute '{}' is required", key)))
    };
    let mut node = NodeDescriptor::new(text(NAME)?, text(ADDRESS)?);
    node.monitor = attributes.get(MONITOR).and_then(Value::as_bool).unwrap_or(false);
    if let Some(description) = attributes.get(DESCRIPTION) {
        node.description = optional_string(description)?;
    }
    if let Some(secret) = attributes.get(TRANSPORT_SECRET) {
        node.transport_secret = optional_string(secret)?;
    }
    Ok(node)
}

/// Apply validated setting changes (everything except `role`) to `node`.
pub(crate) fn apply_settings(node: &mut NodeDescriptor, changes: &Map<String, Value>) -> FailureResult<()> {
    for (name, value) in changes {
        match name.as_str() {
            DESCRIPTION => node.description = optional_string(value)?,
            TRANSPORT_SECRET => node.transport_secret = optional_string(value)?,
            ROLE => {}
            other => {
                return Err(Failure::validation(format!(
                    "replication node attribute '{}' cannot be changed",
                    other
                )))
            }
        }
    }
    Ok(())
}
