//! mqstore - transactional message store with an HA replication group
//!
//! - [`store::MessageStore`]: atomic commit of enqueues and dequeues across
//!   queues, with reference-counted message lifetime
//! - [`replication::ReplicationGroup`]: single-master group with epochs,
//!   quorum acknowledgement and mastership transfer
//! - [`admin::ClusterAdmin`]: authorised, audited cluster administration
//! - [`failure::Failure`]: every error surfaced to callers, classified by
//!   propagation scope

pub mod admin;
pub mod attributes;
pub mod cli;
pub mod failure;
pub mod message;
pub mod observability;
pub mod replication;
pub mod security;
pub mod storage;
pub mod store;
pub mod transfer;
pub mod txn;
