//! Access control for cluster administration
//!
//! Every mutating administration call asks an [`AccessControl`] first. A
//! denial is an `AccessDenied` failure raised before the operation reads or
//! writes anything.

mod access;
mod principal;

pub use access::{AccessControl, AclRule, AclRules, AllowAll, Decision, Operation, Subject};
pub use principal::{ObjectKind, ObjectRef, Principal};
