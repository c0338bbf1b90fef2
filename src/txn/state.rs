//! Transaction lifecycle
//!
//! ```text
//! OPEN ──commit──▶ COMMITTING ──durable──▶ COMMITTED
//!   │                  │
//!   └──rollback──▶ ROLLED_BACK ◀──failed──┘
//! ```
//!
//! COMMITTED and ROLLED_BACK are terminal.

use std::fmt;

use crate::failure::{Failure, FailureResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Open,
    Committing,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Open => "OPEN",
            TransactionState::Committing => "COMMITTING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RolledBack => "ROLLED_BACK",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    fn forbidden(self, to: TransactionState) -> Failure {
        Failure::validation(format!("transaction cannot move from {} to {}", self, to))
    }

    /// OPEN → COMMITTING
    pub fn begin_commit(self) -> FailureResult<Self> {
        match self {
            TransactionState::Open => Ok(TransactionState::Committing),
            other => Err(other.forbidden(TransactionState::Committing)),
        }
    }

    /// COMMITTING → COMMITTED
    pub fn complete(self) -> FailureResult<Self> {
        match self {
            TransactionState::Committing => Ok(TransactionState::Committed),
            other => Err(other.forbidden(TransactionState::Committed)),
        }
    }

    /// OPEN | COMMITTING → ROLLED_BACK
    pub fn roll_back(self) -> FailureResult<Self> {
        match self {
            TransactionState::Open | TransactionState::Committing => {
                Ok(TransactionState::RolledBack)
            }
            other => Err(other.forbidden(TransactionState::RolledBack)),
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
