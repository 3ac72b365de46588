//! Transfer Error Types

use thiserror::Error;

use super::types::Outcome;
use crate::ledger::{AccountId, LedgerError};
use crate::lock_store::LockStoreError;

/// Transfer error types
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Source and target account cannot be the same")]
    SameAccount,

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    // === Account Errors ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds: {account} holds {available}, {requested} requested")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        requested: i64,
    },

    #[error("Amount would overflow the balance of {0}")]
    Overflow(AccountId),

    // === Concurrency Errors ===
    /// A version-checked write matched no row. Retried internally.
    #[error("Version conflict on {0}")]
    VersionConflict(AccountId),

    #[error("Version conflicts persisted after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error("Could not acquire lock {key} after {attempts} attempts")]
    LockAcquisitionFailed { key: String, attempts: u32 },

    // === System Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock store error: {0}")]
    LockStore(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::UnknownStrategy(_) => "UNKNOWN_STRATEGY",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::Overflow(_) => "OVERFLOW",
            TransferError::VersionConflict(_) => "VERSION_CONFLICT",
            TransferError::ConflictRetriesExhausted { .. } => "CONFLICT_RETRIES_EXHAUSTED",
            TransferError::LockAcquisitionFailed { .. } => "LOCK_ACQUISITION_FAILED",
            TransferError::Storage(_) => "STORAGE_ERROR",
            TransferError::LockStore(_) => "LOCK_STORE_ERROR",
            TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount
            | TransferError::SameAccount
            | TransferError::UnknownStrategy(_) => 400,
            TransferError::AccountNotFound(_) => 404,
            TransferError::VersionConflict(_)
            | TransferError::ConflictRetriesExhausted { .. }
            | TransferError::LockAcquisitionFailed { .. } => 409,
            TransferError::InsufficientFunds { .. } | TransferError::Overflow(_) => 422,
            TransferError::Storage(_) | TransferError::Internal(_) => 500,
            TransferError::LockStore(_) => 503,
        }
    }

    /// Outcome reported in a [`TransferResult`](super::TransferResult)
    pub fn outcome(&self) -> Outcome {
        match self {
            TransferError::InvalidAmount
            | TransferError::SameAccount
            | TransferError::UnknownStrategy(_) => Outcome::InvalidRequest,
            TransferError::AccountNotFound(_) => Outcome::AccountNotFound,
            TransferError::InsufficientFunds { .. } => Outcome::InsufficientFunds,
            TransferError::ConflictRetriesExhausted { .. } => Outcome::ConflictRetriesExhausted,
            TransferError::LockAcquisitionFailed { .. } => Outcome::LockAcquisitionFailed,
            TransferError::Overflow(_)
            | TransferError::VersionConflict(_)
            | TransferError::Storage(_)
            | TransferError::LockStore(_)
            | TransferError::Internal(_) => Outcome::TransferError,
        }
    }

    /// Only version conflicts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::VersionConflict(_))
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            other => TransferError::Storage(other.to_string()),
        }
    }
}

impl From<LockStoreError> for TransferError {
    fn from(e: LockStoreError) -> Self {
        TransferError::LockStore(e.to_string())
    }
}
