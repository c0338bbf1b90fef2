//! Cluster administration API
//!
//! Authorization, validation and audit around the replication group's
//! membership and role operations.

mod cluster;

pub use cluster::{ClusterAdmin, ReplicationNode};
