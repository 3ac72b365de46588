//! In-memory ledger backend
//!
//! Rows live in a mutex-guarded map. Each row has an async exclusive lock that
//! a transaction takes before locking reads and before any write, and keeps
//! until it commits or rolls back, so concurrent writers to one row queue up
//! exactly as they do behind PostgreSQL row locks. Writes are buffered in the
//! transaction and applied in one step at commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tokio::time::Instant;

use super::{Account, AccountId, LedgerError, LedgerStore, LedgerTx};

/// Span during which a committed transaction held row locks for writing.
#[derive(Debug, Clone)]
pub struct WriteInterval {
    pub accounts: Vec<AccountId>,
    /// First row lock acquired
    pub started: Instant,
    /// Writes applied (locks still held)
    pub committed: Instant,
}

impl WriteInterval {
    pub fn overlaps(&self, other: &WriteInterval) -> bool {
        self.started < other.committed && other.started < self.committed
    }

    pub fn touches_any(&self, other: &WriteInterval) -> bool {
        self.accounts.iter().any(|a| other.accounts.contains(a))
    }
}

#[derive(Default)]
struct SharedState {
    rows: Mutex<HashMap<AccountId, Account>>,
    row_locks: DashMap<AccountId, Arc<RowLock<()>>>,
    write_log: Mutex<Vec<WriteInterval>>,
}

impl SharedState {
    fn rows(&self) -> MutexGuard<'_, HashMap<AccountId, Account>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_lock(&self, id: &AccountId) -> Arc<RowLock<()>> {
        self.row_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }

    fn committed(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.rows()
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }
}

/// Process-local [`LedgerStore`].
pub struct MemoryLedger {
    state: Arc<SharedState>,
    lock_timeout: Option<Duration>,
    latency: Duration,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState::default()),
            lock_timeout: None,
            latency: Duration::ZERO,
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bound every row-lock wait; expiry fails the statement with
    /// [`LedgerError::LockTimeout`].
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sleep this long in every statement, standing in for a database round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fault injection: make every commit fail until switched off.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Write intervals of every committed transaction so far, in commit order.
    pub fn write_intervals(&self) -> Vec<WriteInterval> {
        self.state
            .write_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        Ok(Box::new(MemoryTx {
            state: self.state.clone(),
            lock_timeout: self.lock_timeout,
            latency: self.latency,
            fail_commits: self.fail_commits.clone(),
            guards: HashMap::new(),
            writes: HashMap::new(),
            first_lock_at: None,
        }))
    }

    async fn initialize(&self, ids: &[AccountId], balance: i64) -> Result<(), LedgerError> {
        // Wait out in-flight writers on every row being replaced, like DELETE would.
        let mut tx = MemoryTx {
            state: self.state.clone(),
            lock_timeout: self.lock_timeout,
            latency: Duration::ZERO,
            fail_commits: Arc::new(AtomicBool::new(false)),
            guards: HashMap::new(),
            writes: HashMap::new(),
            first_lock_at: None,
        };
        let mut all: Vec<AccountId> = self.state.rows().keys().cloned().collect();
        all.extend(ids.iter().cloned());
        all.sort();
        all.dedup();
        for id in &all {
            tx.lock_row(id).await?;
        }

        let mut rows = self.state.rows();
        rows.clear();
        for id in ids {
            rows.insert(
                id.clone(),
                Account {
                    id: id.clone(),
                    balance,
                    version: 0,
                },
            );
        }
        Ok(())
    }

    async fn balances(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError> {
        let rows = self.state.rows();
        let mut found: Vec<Account> = ids.iter().filter_map(|id| rows.get(id).cloned()).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

/// Transaction on a [`MemoryLedger`]. Dropping it releases its row locks and
/// discards buffered writes.
pub struct MemoryTx {
    state: Arc<SharedState>,
    lock_timeout: Option<Duration>,
    latency: Duration,
    fail_commits: Arc<AtomicBool>,
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    writes: HashMap<AccountId, Account>,
    first_lock_at: Option<Instant>,
}

impl MemoryTx {
    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn lock_row(&mut self, id: &AccountId) -> Result<(), LedgerError> {
        if self.guards.contains_key(id) {
            return Ok(());
        }
        let lock = self.state.row_lock(id);
        let guard = match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| LedgerError::LockTimeout(id.clone()))?,
            None => lock.lock_owned().await,
        };
        self.first_lock_at.get_or_insert_with(Instant::now);
        self.guards.insert(id.clone(), guard);
        Ok(())
    }

    /// Own pending write if any, else the committed row.
    fn current(&self, id: &AccountId) -> Result<Account, LedgerError> {
        match self.writes.get(id) {
            Some(pending) => Ok(pending.clone()),
            None => self.state.committed(id),
        }
    }

    fn stage(&mut self, mut row: Account, new_balance: i64) -> Result<(), LedgerError> {
        if new_balance < 0 {
            return Err(LedgerError::NegativeBalance(row.id));
        }
        row.balance = new_balance;
        row.version += 1;
        self.writes.insert(row.id.clone(), row);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn read_pair(
        &mut self,
        a: &AccountId,
        b: &AccountId,
    ) -> Result<(Account, Account), LedgerError> {
        self.round_trip().await;
        Ok((self.current(a)?, self.current(b)?))
    }

    async fn lock_and_read_pair(
        &mut self,
        first: &AccountId,
        second: &AccountId,
    ) -> Result<(Account, Account), LedgerError> {
        self.round_trip().await;
        // FOR UPDATE on a missing row matches nothing and locks nothing
        self.state.committed(first)?;
        self.state.committed(second)?;
        self.lock_row(first).await?;
        self.lock_row(second).await?;
        Ok((self.current(first)?, self.current(second)?))
    }

    async fn update_balance(
        &mut self,
        id: &AccountId,
        new_balance: i64,
    ) -> Result<(), LedgerError> {
        self.round_trip().await;
        self.state.committed(id)?;
        self.lock_row(id).await?;
        let row = self.current(id)?;
        self.stage(row, new_balance)
    }

    async fn compare_and_update_balance(
        &mut self,
        id: &AccountId,
        new_balance: i64,
        expected_version: i64,
    ) -> Result<u64, LedgerError> {
        self.round_trip().await;
        if self.state.committed(id).is_err() {
            return Ok(0);
        }
        self.lock_row(id).await?;
        // Re-evaluated against the latest committed row once the lock is ours
        let row = self.current(id)?;
        if row.version != expected_version {
            return Ok(0);
        }
        self.stage(row, new_balance)?;
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.round_trip().await;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(LedgerError::Fault("injected commit failure".to_string()));
        }
        if self.writes.is_empty() {
            return Ok(());
        }

        {
            let mut rows = self.state.rows();
            for (id, row) in &self.writes {
                rows.insert(id.clone(), row.clone());
            }
        }

        if let Some(started) = self.first_lock_at {
            let mut accounts: Vec<AccountId> = self.writes.keys().cloned().collect();
            accounts.sort();
            self.state
                .write_log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(WriteInterval {
                    accounts,
                    started,
                    committed: Instant::now(),
                });
        }
        // Row locks are released when `self` drops here
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}
