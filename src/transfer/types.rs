//! Transfer Core Types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use super::error::TransferError;
use crate::ledger::{Account, AccountId};

/// Concurrency-control strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Row locks (`SELECT .. FOR UPDATE`) in canonical order
    Pessimistic,
    /// Version-checked writes with bounded retry
    Optimistic,
    /// External mutual-exclusion key
    Distributed,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Pessimistic,
        StrategyKind::Optimistic,
        StrategyKind::Distributed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Pessimistic => "pessimistic",
            StrategyKind::Optimistic => "optimistic",
            StrategyKind::Distributed => "distributed",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pessimistic" => Ok(StrategyKind::Pessimistic),
            "optimistic" => Ok(StrategyKind::Optimistic),
            "distributed" => Ok(StrategyKind::Distributed),
            _ => Err(TransferError::UnknownStrategy(s.to_string())),
        }
    }
}

/// A validated transfer request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    from: AccountId,
    to: AccountId,
    amount: i64,
}

impl TransferRequest {
    pub fn new(
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: i64,
    ) -> Result<Self, TransferError> {
        let from = from.into();
        let to = to.into();
        if amount <= 0 {
            return Err(TransferError::InvalidAmount);
        }
        if from == to {
            return Err(TransferError::SameAccount);
        }
        Ok(Self { from, to, amount })
    }

    pub fn from(&self) -> &AccountId {
        &self.from
    }

    pub fn to(&self) -> &AccountId {
        &self.to
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Both accounts in lexicographic order. Every lock acquisition follows
    /// this order, whichever direction the money moves.
    pub fn ordered_accounts(&self) -> (&AccountId, &AccountId) {
        if self.from <= self.to {
            (&self.from, &self.to)
        } else {
            (&self.to, &self.from)
        }
    }
}

/// Both rows of a transfer, keyed by role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSnapshot {
    pub from: Account,
    pub to: Account,
}

impl PairSnapshot {
    /// Assign two rows read in any order to their roles in `req`.
    pub fn assign(req: &TransferRequest, a: Account, b: Account) -> Self {
        if a.id == *req.from() {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    /// State after one committed write to each row
    pub fn after_write(&self, new_from: i64, new_to: i64) -> Self {
        Self {
            from: Account {
                id: self.from.id.clone(),
                balance: new_from,
                version: self.from.version + 1,
            },
            to: Account {
                id: self.to.id.clone(),
                balance: new_to,
                version: self.to.version + 1,
            },
        }
    }
}

/// Why a transfer ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Committed,
    InsufficientFunds,
    AccountNotFound,
    ConflictRetriesExhausted,
    LockAcquisitionFailed,
    InvalidRequest,
    TransferError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Committed => "COMMITTED",
            Outcome::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Outcome::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Outcome::ConflictRetriesExhausted => "CONFLICT_RETRIES_EXHAUSTED",
            Outcome::LockAcquisitionFailed => "LOCK_ACQUISITION_FAILED",
            Outcome::InvalidRequest => "INVALID_REQUEST",
            Outcome::TransferError => "TRANSFER_ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Result of one transfer invocation, success or not.
///
/// Balances and versions are the post-commit values on success, and the values
/// last observed on failure when the rows were read at all.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub strategy: StrategyKind,
    pub success: bool,
    pub reason: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_version: Option<i64>,
    /// Transfer attempts (optimistic) or lock acquisition tries (distributed)
    pub attempts: u32,
    /// Version conflicts seen before the final attempt
    pub conflicts: u32,
    #[serde(rename = "execution_time_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl TransferResult {
    pub(crate) fn new(
        strategy: StrategyKind,
        reason: Outcome,
        message: String,
        observed: Option<&PairSnapshot>,
    ) -> Self {
        Self {
            strategy,
            success: reason == Outcome::Committed,
            reason,
            message,
            from_balance: observed.map(|s| s.from.balance),
            to_balance: observed.map(|s| s.to.balance),
            from_version: observed.map(|s| s.from.version),
            to_version: observed.map(|s| s.to.version),
            attempts: 0,
            conflicts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Result for a request that never reached a strategy
    pub fn rejected(strategy: StrategyKind, error: &TransferError) -> Self {
        Self::new(strategy, error.outcome(), error.to_string(), None)
    }
}
