//! Master transfer
//!
//! Moving write authority to a chosen replica:
//! 1. Authorisation and target validation, before any change
//! 2. Transport asked to perform the transfer under the next epoch
//! 3. Bounded wait for the outcome
//! 4. On success the new roles and epoch are installed atomically;
//!    on failure every role is left as it was
//!
//! The group manager drives the steps; this module owns the state machine
//! and the validation rules.

mod controller;
mod state;
mod validator;

pub use controller::{TransferController, TransferTicket};
pub use state::TransferState;
pub use validator::{check_target, validate_target, TransferDenial};
