use thiserror::Error;

use super::AccountId;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Timed out waiting for row lock on {0}")]
    LockTimeout(AccountId),

    #[error("Balance of {0} would go negative")]
    NegativeBalance(AccountId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage fault: {0}")]
    Fault(String),
}

impl LedgerError {
    /// PostgreSQL error classification for statements touching one row
    pub(crate) fn from_row_error(e: sqlx::Error, id: &AccountId) -> Self {
        if let sqlx::Error::Database(db) = &e
            && let Some(code) = db.code()
        {
            match code.as_ref() {
                // lock_not_available, raised when lock_timeout expires
                "55P03" => return LedgerError::LockTimeout(id.clone()),
                // check_violation on balance >= 0
                "23514" => return LedgerError::NegativeBalance(id.clone()),
                _ => {}
            }
        }
        LedgerError::Database(e)
    }
}
