//! Per-attempt state machine
//!
//! ```text
//! PENDING → INSUFFICIENT_FUNDS
//!    │   ↘ ERROR
//!    ↓
//! ACQUIRED → COMMITTED
//!    │     ↘ ERROR
//!    ↓
//! CONFLICT → PENDING (retry)
//! ```
//!
//! Every strategy walks the same shape; they differ in what "acquired" means
//! (row locks, a version snapshot, or an external lock key).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    Pending,
    /// Funds validated, write step in progress
    Acquired,
    Committed,
    InsufficientFunds,
    Conflict,
    Error,
}

impl TransferState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Committed | TransferState::InsufficientFunds | TransferState::Error
        )
    }

    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Pending, Acquired)
                | (Pending, InsufficientFunds)
                | (Pending, Error)
                | (Acquired, Committed)
                | (Acquired, Conflict)
                | (Acquired, Error)
                | (Conflict, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "PENDING",
            TransferState::Acquired => "ACQUIRED",
            TransferState::Committed => "COMMITTED",
            TransferState::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransferState::Conflict => "CONFLICT",
            TransferState::Error => "ERROR",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
