//! Declarative attribute schemas for configured objects
//!
//! Each object category declares its attributes once (type, mutability,
//! default, allowed values). One generic validator interprets every schema.

mod node;
mod schema;
mod types;

pub use node::{
    node_attributes, node_from_attributes, replication_node_schema, ADDRESS, DESCRIPTION,
    LAST_KNOWN_EPOCH, MONITOR, NAME, ROLE, TRANSPORT_SECRET,
};
pub use schema::{AttributeSchema, MASKED_VALUE};
pub use types::{AttributeSpec, AttributeType, Mutability};

pub(crate) use node::apply_settings;
