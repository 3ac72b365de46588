//! Distributed lock
//!
//! Mutual exclusion comes from a key in an external [`LockStore`] rather than
//! from the database. The key is derived from the lexicographically smaller
//! account id, so every transfer touching the pair contends for the same key
//! whichever direction it moves money. Inside the lock the ledger is read and
//! written without row locks.
//!
//! Ownership is a random token stored under the key; release deletes the key
//! only while it still holds our token, so a holder whose TTL already ran out
//! cannot delete its successor's lock.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::TransferError;
use super::strategy::{AttemptLog, Failure, TransferStrategy, check_write_commit};
use super::types::{PairSnapshot, StrategyKind, TransferRequest, TransferResult};
use crate::config::DistributedConfig;
use crate::ledger::LedgerStore;
use crate::lock_store::LockStore;

pub struct DistributedStrategy {
    ledger: Arc<dyn LedgerStore>,
    locks: Arc<dyn LockStore>,
    config: DistributedConfig,
}

impl DistributedStrategy {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        locks: Arc<dyn LockStore>,
        config: DistributedConfig,
    ) -> Self {
        Self {
            ledger,
            locks,
            config,
        }
    }

    /// Lock key for the pair in `req`
    pub fn lock_key(&self, req: &TransferRequest) -> String {
        format!("{}{}", self.config.key_prefix, req.ordered_accounts().0)
    }

    /// Try to take `key` up to `max_attempts` times, sleeping `retry_delay`
    /// between tries. Returns the number of tries used.
    async fn acquire(&self, key: &str, token: &str) -> Result<u32, TransferError> {
        let max_attempts = self.config.max_attempts.max(1);
        let ttl = self.config.lock_ttl();

        for attempt in 1..=max_attempts {
            match self.locks.set_if_absent(key, token, ttl).await {
                Ok(true) => {
                    debug!(key = %key, attempt, "Lock acquired");
                    return Ok(attempt);
                }
                Ok(false) => {}
                Err(e) => warn!(key = %key, attempt, error = %e, "Lock store error during acquire"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        Err(TransferError::LockAcquisitionFailed {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    async fn release(&self, key: &str, token: &str) {
        match self.locks.compare_and_delete(key, token).await {
            Ok(true) => debug!(key = %key, "Lock released"),
            Ok(false) => warn!(key = %key, "Lock expired before release"),
            // The TTL will free the key
            Err(e) => warn!(key = %key, error = %e, "Lock release failed"),
        }
    }

    async fn attempt(
        &self,
        req: &TransferRequest,
        log: &mut AttemptLog,
    ) -> Result<PairSnapshot, Failure> {
        let mut tx = self.ledger.begin().await?;

        let (a, b) = tx.read_pair(req.from(), req.to()).await?;
        let snapshot = PairSnapshot::assign(req, a, b);

        check_write_commit(tx, req, snapshot, log).await
    }
}

#[async_trait]
impl TransferStrategy for DistributedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Distributed
    }

    async fn transfer(&self, req: &TransferRequest) -> TransferResult {
        let mut log = AttemptLog::new(self.kind());
        log.begin_attempt();

        let key = self.lock_key(req);
        let token = Uuid::new_v4().to_string();

        match self.acquire(&key, &token).await {
            Ok(tries) => log.set_attempts(tries),
            Err(e) => {
                log.set_attempts(self.config.max_attempts.max(1));
                return log.failed(e.into());
            }
        }

        // If this future is dropped mid-transfer the key is never released
        // here; it frees itself when the TTL runs out.
        let outcome = self.attempt(req, &mut log).await;
        self.release(&key, &token).await;

        match outcome {
            Ok(snapshot) => log.committed(snapshot),
            Err(failure) => log.failed(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountId, MemoryLedger};
    use crate::lock_store::MemoryLockStore;
    use crate::transfer::Outcome;
    use std::time::Duration;

    fn ids() -> [AccountId; 2] {
        [AccountId::from("account_a"), AccountId::from("account_b")]
    }

    fn config(max_attempts: u32) -> DistributedConfig {
        DistributedConfig {
            key_prefix: "transfer_lock:".to_string(),
            lock_ttl_ms: 10_000,
            max_attempts,
            retry_delay_ms: 100,
        }
    }

    async fn setup(max_attempts: u32) -> (Arc<MemoryLedger>, Arc<MemoryLockStore>, DistributedStrategy) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.initialize(&ids(), 100_000).await.unwrap();
        let locks = Arc::new(MemoryLockStore::new());
        let strategy = DistributedStrategy::new(ledger.clone(), locks.clone(), config(max_attempts));
        (ledger, locks, strategy)
    }

    #[tokio::test]
    async fn test_lock_key_uses_smaller_id() {
        let (_, _, strategy) = setup(50).await;
        let forward = TransferRequest::new("account_a", "account_b", 1).unwrap();
        let backward = TransferRequest::new("account_b", "account_a", 1).unwrap();
        assert_eq!(strategy.lock_key(&forward), "transfer_lock:account_a");
        assert_eq!(strategy.lock_key(&backward), "transfer_lock:account_a");
    }

    #[tokio::test]
    async fn test_transfer_releases_lock() {
        let (_, locks, strategy) = setup(50).await;
        let req = TransferRequest::new("account_a", "account_b", 10_000).unwrap();

        let result = strategy.transfer(&req).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.from_balance, Some(90_000));
        assert_eq!(result.to_balance, Some(110_000));
        assert_eq!(result.attempts, 1);
        assert!(locks.get("transfer_lock:account_a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insufficient_funds_still_releases_lock() {
        let (_, locks, strategy) = setup(50).await;
        let req = TransferRequest::new("account_a", "account_b", 100_001).unwrap();

        let result = strategy.transfer(&req).await;

        assert_eq!(result.reason, Outcome::InsufficientFunds);
        assert!(locks.list("transfer_lock:").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_while_lock_is_held() {
        let (ledger, locks, strategy) = setup(3).await;
        locks
            .set_if_absent("transfer_lock:account_a", "other", Duration::from_secs(60))
            .await
            .unwrap();

        let req = TransferRequest::new("account_a", "account_b", 10_000).unwrap();
        let result = strategy.transfer(&req).await;

        assert!(!result.success);
        assert_eq!(result.reason, Outcome::LockAcquisitionFailed);
        assert_eq!(result.attempts, 3);
        // The other holder's lock survives our give-up
        assert_eq!(
            locks.get("transfer_lock:account_a").await.unwrap().as_deref(),
            Some("other")
        );
        let rows = ledger.balances(&ids()).await.unwrap();
        assert!(rows.iter().all(|r| r.balance == 100_000 && r.version == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_holder_to_release() {
        let (_, locks, strategy) = setup(50).await;
        locks
            .set_if_absent("transfer_lock:account_a", "other", Duration::from_secs(60))
            .await
            .unwrap();

        let releaser = {
            let locks = locks.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                locks
                    .compare_and_delete("transfer_lock:account_a", "other")
                    .await
                    .unwrap()
            })
        };

        let req = TransferRequest::new("account_a", "account_b", 10_000).unwrap();
        let result = strategy.transfer(&req).await;

        assert!(releaser.await.unwrap());
        assert!(result.success, "{}", result.message);
        // Tries at 0, 100, 200 ms fail; 300 ms succeeds
        assert_eq!(result.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_is_taken_over() {
        let (_, locks, strategy) = setup(50).await;
        locks
            .set_if_absent("transfer_lock:account_a", "crashed", Duration::from_millis(150))
            .await
            .unwrap();

        let req = TransferRequest::new("account_a", "account_b", 10_000).unwrap();
        let result = strategy.transfer(&req).await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
    }
}
