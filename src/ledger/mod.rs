//! Ledger Store
//!
//! The two account rows are the only shared mutable state in the system.
//! Every mutation goes through a [`LedgerTx`] obtained from [`LedgerStore::begin`]:
//! writes become visible only on [`LedgerTx::commit`], and dropping an
//! uncommitted transaction rolls it back.
//!
//! # Backends
//!
//! - [`PgLedger`]: PostgreSQL, `SELECT .. FOR UPDATE` row locks and
//!   `UPDATE .. WHERE version = $n` conditional writes.
//! - [`MemoryLedger`]: process-local rows with the same blocking row-lock
//!   semantics, used by tests and by the binary when no database is configured.

pub mod error;
pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::LedgerError;
pub use memory::{MemoryLedger, WriteInterval};
pub use postgres::PgLedger;

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: i64,
    /// Bumped by exactly 1 on every committed write to the row
    pub version: i64,
}

/// Storage collaborator shared by all transfer strategies.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError>;

    /// Delete every account and reinsert `ids` with `balance` and version 0,
    /// atomically.
    async fn initialize(&self, ids: &[AccountId], balance: i64) -> Result<(), LedgerError>;

    /// Committed state of the given accounts, ordered by id. Missing ids are
    /// skipped.
    async fn balances(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError>;
}

/// An open ledger transaction.
///
/// Row locks taken by [`lock_and_read_pair`](LedgerTx::lock_and_read_pair),
/// [`update_balance`](LedgerTx::update_balance) and
/// [`compare_and_update_balance`](LedgerTx::compare_and_update_balance) are
/// held until commit or rollback.
#[async_trait]
pub trait LedgerTx: Send {
    /// Plain read of both rows, no locks taken.
    async fn read_pair(
        &mut self,
        a: &AccountId,
        b: &AccountId,
    ) -> Result<(Account, Account), LedgerError>;

    /// Lock `first` then `second` exclusively and read them. Callers pick the
    /// order; the result comes back in the same order.
    async fn lock_and_read_pair(
        &mut self,
        first: &AccountId,
        second: &AccountId,
    ) -> Result<(Account, Account), LedgerError>;

    /// Unconditional write. Bumps the version.
    async fn update_balance(&mut self, id: &AccountId, new_balance: i64)
    -> Result<(), LedgerError>;

    /// Write only if the row is still at `expected_version`. Returns the
    /// number of rows matched (0 or 1).
    async fn compare_and_update_balance(
        &mut self,
        id: &AccountId,
        new_balance: i64,
        expected_version: i64,
    ) -> Result<u64, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
