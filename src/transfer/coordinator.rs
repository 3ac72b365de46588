//! Transfer Coordinator
//!
//! Owns the three strategies over one shared ledger and lock store, and the
//! account-level operations around them (reset, balance query, lock listing).

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::distributed::DistributedStrategy;
use super::error::TransferError;
use super::optimistic::OptimisticStrategy;
use super::pessimistic::PessimisticStrategy;
use super::strategy::TransferStrategy;
use super::types::{StrategyKind, TransferRequest, TransferResult};
use crate::config::{AppConfig, DistributedConfig, LedgerConfig, OptimisticConfig};
use crate::ledger::{Account, AccountId, LedgerStore};
use crate::lock_store::{LockEntry, LockStore};

/// Static description of a strategy
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub strategy: StrategyKind,
    pub method: &'static str,
    pub technique: &'static str,
    pub description: &'static str,
    pub retries: String,
    pub pros: &'static [&'static str],
    pub cons: &'static [&'static str],
}

pub struct TransferCoordinator {
    ledger: Arc<dyn LedgerStore>,
    locks: Arc<dyn LockStore>,
    accounts: [AccountId; 2],
    initial_balance: i64,
    optimistic_config: OptimisticConfig,
    distributed_config: DistributedConfig,
    pessimistic: PessimisticStrategy,
    optimistic: OptimisticStrategy,
    distributed: DistributedStrategy,
}

impl TransferCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        locks: Arc<dyn LockStore>,
        ledger_config: &LedgerConfig,
        optimistic_config: OptimisticConfig,
        distributed_config: DistributedConfig,
    ) -> Self {
        let [a, b] = &ledger_config.accounts;
        Self {
            pessimistic: PessimisticStrategy::new(ledger.clone()),
            optimistic: OptimisticStrategy::new(ledger.clone(), optimistic_config.clone()),
            distributed: DistributedStrategy::new(
                ledger.clone(),
                locks.clone(),
                distributed_config.clone(),
            ),
            ledger,
            locks,
            accounts: [AccountId::new(a.clone()), AccountId::new(b.clone())],
            initial_balance: ledger_config.initial_balance,
            optimistic_config,
            distributed_config,
        }
    }

    pub fn from_config(
        ledger: Arc<dyn LedgerStore>,
        locks: Arc<dyn LockStore>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            ledger,
            locks,
            &config.ledger,
            config.optimistic.clone(),
            config.distributed.clone(),
        )
    }

    pub fn strategy(&self, kind: StrategyKind) -> &dyn TransferStrategy {
        match kind {
            StrategyKind::Pessimistic => &self.pessimistic,
            StrategyKind::Optimistic => &self.optimistic,
            StrategyKind::Distributed => &self.distributed,
        }
    }

    /// The two managed accounts, in configured order
    pub fn accounts(&self) -> &[AccountId; 2] {
        &self.accounts
    }

    pub fn initial_balance(&self) -> i64 {
        self.initial_balance
    }

    pub fn ledger_backend(&self) -> &'static str {
        self.ledger.name()
    }

    pub fn lock_backend(&self) -> &'static str {
        self.locks.name()
    }

    /// Run a validated request through the chosen strategy
    pub async fn transfer(&self, kind: StrategyKind, req: &TransferRequest) -> TransferResult {
        self.strategy(kind).transfer(req).await
    }

    /// Validate raw input and run it. Invalid input comes back as a failed
    /// result with reason `INVALID_REQUEST`.
    pub async fn submit(
        &self,
        kind: StrategyKind,
        from: &str,
        to: &str,
        amount: i64,
    ) -> TransferResult {
        match TransferRequest::new(from, to, amount) {
            Ok(req) => self.transfer(kind, &req).await,
            Err(e) => TransferResult::rejected(kind, &e),
        }
    }

    /// Reset both accounts to the initial balance with version 0.
    pub async fn initialize(&self) -> Result<Vec<Account>, TransferError> {
        self.ledger
            .initialize(&self.accounts, self.initial_balance)
            .await?;
        info!(
            accounts = ?self.accounts,
            balance = self.initial_balance,
            backend = self.ledger.name(),
            "Accounts initialized"
        );
        self.balances().await
    }

    /// Committed state of both accounts, ordered by id
    pub async fn balances(&self) -> Result<Vec<Account>, TransferError> {
        Ok(self.ledger.balances(&self.accounts).await?)
    }

    /// Transfer locks currently held in the lock store
    pub async fn lock_info(&self) -> Result<Vec<LockEntry>, TransferError> {
        Ok(self.locks.list(&self.distributed_config.key_prefix).await?)
    }

    pub fn strategy_info(&self, kind: StrategyKind) -> StrategyInfo {
        match kind {
            StrategyKind::Pessimistic => StrategyInfo {
                strategy: kind,
                method: "Pessimistic Lock",
                technique: "SELECT ... FOR UPDATE in account id order",
                description: "Locks both account rows before reading them and holds the locks until commit",
                retries: "none, waiters queue on the row locks".to_string(),
                pros: &[
                    "Consistency enforced by the database",
                    "Simple to implement",
                    "Canonical lock order rules out deadlock between transfers",
                ],
                cons: &[
                    "Waiters block for the full transaction",
                    "Throughput drops under contention",
                ],
            },
            StrategyKind::Optimistic => StrategyInfo {
                strategy: kind,
                method: "Optimistic Lock",
                technique: "UPDATE ... WHERE version = <read version>",
                description: "Reads without locks and detects concurrent modification at write time",
                retries: format!(
                    "up to {} attempts, backoff {} ms doubling",
                    self.optimistic_config.max_attempts, self.optimistic_config.base_delay_ms
                ),
                pros: &[
                    "No lock wait on read",
                    "High throughput when conflicts are rare",
                ],
                cons: &[
                    "Conflicts cost a full retry",
                    "Requests can fail once retries run out",
                    "Degrades under heavy contention",
                ],
            },
            StrategyKind::Distributed => StrategyInfo {
                strategy: kind,
                method: "Distributed Lock",
                technique: "set-if-absent with TTL, token-checked atomic release",
                description: "Serializes transfers on a lock key shared by every process",
                retries: format!(
                    "up to {} lock attempts, {} ms apart",
                    self.distributed_config.max_attempts, self.distributed_config.retry_delay_ms
                ),
                pros: &[
                    "Coordinates independent processes",
                    "TTL frees locks of crashed holders",
                ],
                cons: &[
                    "Extra round trips to the lock store",
                    "Lock store availability becomes a dependency",
                    "A holder outliving its TTL loses exclusivity",
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::lock_store::MemoryLockStore;
    use crate::transfer::Outcome;

    fn coordinator() -> TransferCoordinator {
        TransferCoordinator::from_config(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryLockStore::new()),
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_initialize_resets_accounts() {
        let coordinator = coordinator();
        coordinator.initialize().await.unwrap();

        let result = coordinator
            .submit(StrategyKind::Pessimistic, "account_a", "account_b", 10_000)
            .await;
        assert!(result.success);

        let rows = coordinator.initialize().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.balance == 100_000 && r.version == 0));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_input() {
        let coordinator = coordinator();
        coordinator.initialize().await.unwrap();

        let result = coordinator
            .submit(StrategyKind::Optimistic, "account_a", "account_b", 0)
            .await;
        assert!(!result.success);
        assert_eq!(result.reason, Outcome::InvalidRequest);

        let result = coordinator
            .submit(StrategyKind::Distributed, "account_a", "account_a", 5)
            .await;
        assert_eq!(result.reason, Outcome::InvalidRequest);
    }

    #[tokio::test]
    async fn test_each_strategy_is_routed() {
        let coordinator = coordinator();
        coordinator.initialize().await.unwrap();

        for kind in StrategyKind::ALL {
            assert_eq!(coordinator.strategy(kind).kind(), kind);
            let result = coordinator
                .submit(kind, "account_a", "account_b", 1_000)
                .await;
            assert_eq!(result.strategy, kind);
            assert!(result.success);
        }

        let rows = coordinator.balances().await.unwrap();
        assert_eq!(rows[0].balance, 97_000);
        assert_eq!(rows[1].balance, 103_000);
        assert_eq!(rows[0].version, 3);
    }

    #[tokio::test]
    async fn test_lock_info_is_empty_when_idle() {
        let coordinator = coordinator();
        coordinator.initialize().await.unwrap();
        coordinator
            .submit(StrategyKind::Distributed, "account_a", "account_b", 1)
            .await;
        assert!(coordinator.lock_info().await.unwrap().is_empty());
    }

    #[test]
    fn test_strategy_info() {
        let coordinator = coordinator();
        let info = coordinator.strategy_info(StrategyKind::Optimistic);
        assert!(info.retries.contains("5 attempts"));
        assert!(!info.pros.is_empty() && !info.cons.is_empty());
        assert_eq!(
            serde_json::to_value(&info).unwrap()["strategy"],
            "optimistic"
        );
    }
}
