//! Transfer controller
//!
//! Purely coordinating: owns the transfer state machine and hands out a
//! [`TransferTicket`] for the one transfer allowed in flight. Dropping a
//! ticket without finishing it (the caller's future was cancelled) records
//! the transfer as failed.

use std::sync::{Mutex, MutexGuard};

use super::state::TransferState;
use crate::failure::{FailureKind, FailureResult};

#[derive(Debug, Default)]
pub struct TransferController {
    state: Mutex<TransferState>,
}

impl TransferController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransferState> {
        // The state is replaced whole on every transition.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(
        &self,
        step: impl FnOnce(TransferState) -> FailureResult<TransferState>,
    ) -> FailureResult<()> {
        let mut state = self.lock();
        let current = std::mem::take(&mut *state);
        match step(current.clone()) {
            Ok(next) => {
                *state = next;
                Ok(())
            }
            Err(err) => {
                *state = current;
                Err(err)
            }
        }
    }

    pub fn state(&self) -> TransferState {
        self.lock().clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.lock().is_in_progress()
    }

    /// Start a transfer to `target`. Fails if one is already in flight.
    pub fn begin(&self, target: &str) -> FailureResult<TransferTicket<'_>> {
        self.transition(|state| state.request(target))?;
        Ok(TransferTicket {
            controller: self,
            finished: false,
        })
    }
}

/// Exclusive handle on the in-flight transfer.
#[must_use]
pub struct TransferTicket<'a> {
    controller: &'a TransferController,
    finished: bool,
}

impl TransferTicket<'_> {
    pub fn dispatch(&self, epoch: u64) -> FailureResult<()> {
        self.controller.transition(|state| state.dispatch(epoch))
    }

    pub fn succeed(mut self) -> FailureResult<()> {
        self.finished = true;
        self.controller.transition(TransferState::succeed)
    }

    pub fn fail(mut self, kind: FailureKind) {
        self.finished = true;
        self.record_failure(kind);
    }

    fn record_failure(&self, kind: FailureKind) {
        if let Err(err) = self.controller.transition(|state| state.fail(kind)) {
            tracing::warn!(error = %err, "transfer state was already settled");
        }
    }
}

impl Drop for TransferTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("master transfer abandoned before completion");
            self.record_failure(FailureKind::ConnectionScoped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_transfer_in_flight() {
        let controller = TransferController::new();
        let ticket = controller.begin("node-b").unwrap();
        assert!(controller.is_in_progress());
        assert!(controller.begin("node-c").is_err());

        ticket.dispatch(3).unwrap();
        ticket.succeed().unwrap();
        assert!(!controller.is_in_progress());
        assert!(controller.begin("node-c").is_ok());
    }

    #[test]
    fn test_dropped_ticket_records_failure() {
        let controller = TransferController::new();
        {
            let ticket = controller.begin("node-b").unwrap();
            ticket.dispatch(2).unwrap();
        }
        assert_eq!(
            controller.state(),
            TransferState::Failed {
                target: "node-b".to_string(),
                kind: FailureKind::ConnectionScoped
            }
        );
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let controller = TransferController::new();
        let ticket = controller.begin("node-b").unwrap();
        // Not dispatched yet.
        assert!(controller.transition(TransferState::succeed).is_err());
        assert_eq!(controller.state().state_name(), "Requested");
        ticket.fail(FailureKind::Validation);
        assert_eq!(controller.state().state_name(), "Failed");
    }
}
