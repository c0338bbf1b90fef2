//! Master transfer state machine
//!
//! - States are explicit and enumerable
//! - Transitions consume the old state and are never inferred
//! - At most one transfer is in flight per node
//! - A failed transfer leaves group roles exactly as they were

use crate::failure::{Failure, FailureKind, FailureResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer in progress.
    Steady,

    /// A transfer to `target` was requested; not yet validated.
    Requested { target: String },

    /// The transport accepted the request; waiting for its outcome.
    AwaitingTransport { target: String, epoch: u64 },

    /// The target became master under `epoch`.
    Succeeded { target: String, epoch: u64 },

    /// The transfer did not complete.
    Failed { target: String, kind: FailureKind },
}

impl Default for TransferState {
    fn default() -> Self {
        Self::Steady
    }
}

impl TransferState {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Steady => "Steady",
            Self::Requested { .. } => "Requested",
            Self::AwaitingTransport { .. } => "AwaitingTransport",
            Self::Succeeded { .. } => "Succeeded",
            Self::Failed { .. } => "Failed",
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Requested { .. } | Self::AwaitingTransport { .. })
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Steady => None,
            Self::Requested { target }
            | Self::AwaitingTransport { target, .. }
            | Self::Succeeded { target, .. }
            | Self::Failed { target, .. } => Some(target),
        }
    }

    fn forbidden(&self, to: &str) -> Failure {
        Failure::validation(format!(
            "master transfer cannot move from {} to {}",
            self.state_name(),
            to
        ))
    }

    /// Steady | Succeeded | Failed → Requested
    pub fn request(self, target: impl Into<String>) -> FailureResult<Self> {
        match self {
            Self::Steady | Self::Succeeded { .. } | Self::Failed { .. } => Ok(Self::Requested {
                target: target.into(),
            }),
            other => Err(other.forbidden("Requested")),
        }
    }

    /// Requested → AwaitingTransport
    pub fn dispatch(self, epoch: u64) -> FailureResult<Self> {
        match self {
            Self::Requested { target } => Ok(Self::AwaitingTransport { target, epoch }),
            other => Err(other.forbidden("AwaitingTransport")),
        }
    }

    /// AwaitingTransport → Succeeded
    pub fn succeed(self) -> FailureResult<Self> {
        match self {
            Self::AwaitingTransport { target, epoch } => Ok(Self::Succeeded { target, epoch }),
            other => Err(other.forbidden("Succeeded")),
        }
    }

    /// Requested | AwaitingTransport → Failed
    pub fn fail(self, kind: FailureKind) -> FailureResult<Self> {
        match self {
            Self::Requested { target } | Self::AwaitingTransport { target, .. } => {
                Ok(Self::Failed { target, kind })
            }
            other => Err(other.forbidden("Failed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = TransferState::Steady
            .request("node-b")
            .unwrap()
            .dispatch(4)
            .unwrap()
            .succeed()
            .unwrap();
        assert_eq!(
            state,
            TransferState::Succeeded {
                target: "node-b".to_string(),
                epoch: 4
            }
        );
        assert!(!state.is_in_progress());
    }

    #[test]
    fn test_cannot_request_twice() {
        let state = TransferState::Steady.request("node-b").unwrap();
        assert!(state.is_in_progress());
        assert!(state.request("node-c").is_err());
    }

    #[test]
    fn test_cannot_succeed_without_dispatch() {
        let state = TransferState::Steady.request("node-b").unwrap();
        assert!(state.succeed().is_err());
    }

    #[test]
    fn test_failure_records_kind() {
        let state = TransferState::Steady
            .request("node-b")
            .unwrap()
            .dispatch(2)
            .unwrap()
            .fail(FailureKind::ConnectionScoped)
            .unwrap();
        assert_eq!(state.state_name(), "Failed");
        assert_eq!(state.target(), Some("node-b"));

        // A finished transfer does not block the next one.
        assert!(state.request("node-c").is_ok());
    }
}
