//! End-to-end transfer scenarios against the in-memory backends
//!
//! Tests on the default `current_thread` runtime are deterministic: without
//! injected latency each transfer runs to completion inside a single poll, so
//! N spawned transfers execute back to back. The `multi_thread` tests inject
//! per-statement latency to force real interleaving and assert what must hold
//! under any schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use ledger_locks::config::{AppConfig, DistributedConfig, OptimisticConfig};
use ledger_locks::ledger::{AccountId, LedgerStore, LedgerTx, MemoryLedger, WriteInterval};
use ledger_locks::lock_store::{LockEntry, LockStore, LockStoreError, MemoryLockStore};
use ledger_locks::transfer::stress::{self, StressPlan};
use ledger_locks::transfer::{
    Outcome, StrategyKind, TransferCoordinator, TransferRequest, TransferResult,
};

const INITIAL: i64 = 100_000;
const AMOUNT: i64 = 10_000;

fn coordinator_with(
    ledger: Arc<MemoryLedger>,
    locks: Arc<dyn LockStore>,
    config: &AppConfig,
) -> Arc<TransferCoordinator> {
    Arc::new(TransferCoordinator::from_config(ledger, locks, config))
}

async fn setup() -> (Arc<MemoryLedger>, Arc<TransferCoordinator>) {
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = coordinator_with(
        ledger.clone(),
        Arc::new(MemoryLockStore::new()),
        &AppConfig::default(),
    );
    coordinator.initialize().await.unwrap();
    (ledger, coordinator)
}

fn request(from: &str, to: &str, amount: i64) -> TransferRequest {
    TransferRequest::new(from, to, amount).unwrap()
}

async fn run_concurrently(
    coordinator: &Arc<TransferCoordinator>,
    kind: StrategyKind,
    requests: Vec<TransferRequest>,
) -> Vec<TransferResult> {
    let handles: Vec<_> = requests
        .into_iter()
        .map(|req| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.transfer(kind, &req).await })
        })
        .collect();
    join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect()
}

/// (balance, version) per account, ordered by id
async fn rows(coordinator: &TransferCoordinator) -> Vec<(i64, i64)> {
    coordinator
        .balances()
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.balance, a.version))
        .collect()
}

/// No two committed writers to a common row held their locks at the same time
fn assert_serialized(intervals: &[WriteInterval]) {
    for (i, x) in intervals.iter().enumerate() {
        for y in &intervals[i + 1..] {
            assert!(
                !(x.touches_any(y) && x.overlaps(y)),
                "overlapping writers: {:?} / {:?}",
                x,
                y
            );
        }
    }
}

// ============================================================================
// Single transfers
// ============================================================================

#[tokio::test]
async fn test_sequential_transfer_every_strategy() {
    for kind in StrategyKind::ALL {
        let (_, coordinator) = setup().await;

        let result = coordinator
            .transfer(kind, &request("account_a", "account_b", AMOUNT))
            .await;

        assert!(result.success, "{}: {}", kind, result.message);
        assert_eq!(result.reason, Outcome::Committed);
        assert_eq!(result.from_balance, Some(90_000));
        assert_eq!(result.to_balance, Some(110_000));
        assert_eq!(rows(&coordinator).await, vec![(90_000, 1), (110_000, 1)]);
    }
}

#[tokio::test]
async fn test_insufficient_funds_every_strategy() {
    for kind in StrategyKind::ALL {
        let (ledger, coordinator) = setup().await;

        let result = coordinator
            .transfer(kind, &request("account_a", "account_b", 200_000))
            .await;

        assert!(!result.success);
        assert_eq!(result.reason, Outcome::InsufficientFunds, "{}", kind);
        assert_eq!(rows(&coordinator).await, vec![(INITIAL, 0), (INITIAL, 0)]);
        assert!(ledger.write_intervals().is_empty());
    }
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let (_, coordinator) = setup().await;
    coordinator
        .transfer(
            StrategyKind::Optimistic,
            &request("account_a", "account_b", AMOUNT),
        )
        .await;

    coordinator.initialize().await.unwrap();
    let first = rows(&coordinator).await;
    coordinator.initialize().await.unwrap();
    assert_eq!(rows(&coordinator).await, first);
    assert_eq!(first, vec![(INITIAL, 0), (INITIAL, 0)]);
}

// ============================================================================
// Over-subscription (deterministic, back to back)
// ============================================================================

#[tokio::test]
async fn test_oversubscribed_run_rejects_the_excess() {
    for kind in StrategyKind::ALL {
        let (_, coordinator) = setup().await;
        let requests = (0..12)
            .map(|_| request("account_a", "account_b", AMOUNT))
            .collect();

        let results = run_concurrently(&coordinator, kind, requests).await;

        let committed = results.iter().filter(|r| r.success).count();
        let rejected = results
            .iter()
            .filter(|r| r.reason == Outcome::InsufficientFunds)
            .count();
        assert_eq!((committed, rejected), (10, 2), "{}", kind);
        assert_eq!(rows(&coordinator).await, vec![(0, 10), (200_000, 10)]);
    }
}

// ============================================================================
// Interleaved schedules
// ============================================================================

fn slow_config() -> AppConfig {
    AppConfig {
        optimistic: OptimisticConfig {
            max_attempts: 5,
            base_delay_ms: 1,
        },
        distributed: DistributedConfig {
            max_attempts: 1_000,
            retry_delay_ms: 2,
            ..DistributedConfig::default()
        },
        ..AppConfig::default()
    }
}

async fn slow_setup(locks: Arc<dyn LockStore>) -> (Arc<MemoryLedger>, Arc<TransferCoordinator>) {
    slow_setup_with(locks, &slow_config()).await
}

async fn slow_setup_with(
    locks: Arc<dyn LockStore>,
    config: &AppConfig,
) -> (Arc<MemoryLedger>, Arc<TransferCoordinator>) {
    let ledger = Arc::new(MemoryLedger::new().with_latency(Duration::from_millis(2)));
    let coordinator = coordinator_with(ledger.clone(), locks, config);
    coordinator.initialize().await.unwrap();
    (ledger, coordinator)
}

fn drain_requests() -> Vec<TransferRequest> {
    (0..10)
        .map(|_| request("account_a", "account_b", AMOUNT))
        .collect()
}

/// Every failed optimistic attempt loses to a different commit, so with as
/// many attempts as contenders each contender eventually commits.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturation_every_strategy() {
    let config = AppConfig {
        optimistic: OptimisticConfig {
            max_attempts: 10,
            base_delay_ms: 1,
        },
        ..slow_config()
    };
    for kind in StrategyKind::ALL {
        let (ledger, coordinator) =
            slow_setup_with(Arc::new(MemoryLockStore::new()), &config).await;

        let results = run_concurrently(&coordinator, kind, drain_requests()).await;

        for r in &results {
            assert!(r.success, "{}: {} ({})", kind, r.message, r.reason);
            assert!(r.conflicts < 10, "{}", kind);
        }
        assert_eq!(rows(&coordinator).await, vec![(0, 10), (200_000, 10)], "{}", kind);
        assert_serialized(&ledger.write_intervals());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pessimistic_waiters_all_commit() {
    let (ledger, coordinator) = slow_setup(Arc::new(MemoryLockStore::new())).await;
    let requests = drain_requests();

    let results = run_concurrently(&coordinator, StrategyKind::Pessimistic, requests).await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(rows(&coordinator).await, vec![(0, 10), (200_000, 10)]);
    assert_serialized(&ledger.write_intervals());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_optimistic_invariants_under_contention() {
    let (ledger, coordinator) = slow_setup(Arc::new(MemoryLockStore::new())).await;
    let requests = drain_requests();

    let results = run_concurrently(&coordinator, StrategyKind::Optimistic, requests).await;

    // A contender that gives up lost 5 attempts to 5 distinct commits
    let successes = results.iter().filter(|r| r.success).count() as i64;
    assert!(successes >= 5, "only {} committed", successes);
    for r in results.iter().filter(|r| !r.success) {
        assert_eq!(r.reason, Outcome::ConflictRetriesExhausted);
        assert_eq!(r.attempts, 5);
    }
    assert_eq!(
        rows(&coordinator).await,
        vec![
            (INITIAL - successes * AMOUNT, successes),
            (INITIAL + successes * AMOUNT, successes)
        ]
    );
    assert_serialized(&ledger.write_intervals());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_directions_do_not_deadlock() {
    for kind in StrategyKind::ALL {
        let (_, coordinator) = slow_setup(Arc::new(MemoryLockStore::new())).await;
        let requests = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    request("account_a", "account_b", 1_000)
                } else {
                    request("account_b", "account_a", 1_000)
                }
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(30),
            run_concurrently(&coordinator, kind, requests),
        )
        .await
        .expect("transfers deadlocked");

        let balances = rows(&coordinator).await;
        assert_eq!(balances[0].0 + balances[1].0, 2 * INITIAL, "{}", kind);
        if kind != StrategyKind::Optimistic {
            assert!(results.iter().all(|r| r.success), "{}", kind);
            assert_eq!(balances, vec![(INITIAL, 10), (INITIAL, 10)]);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_strategies_in_opposite_directions_do_not_deadlock() {
    let (ledger, coordinator) = slow_setup(Arc::new(MemoryLockStore::new())).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        for (kind, from, to) in [
            (StrategyKind::Distributed, "account_b", "account_a"),
            (StrategyKind::Pessimistic, "account_a", "account_b"),
        ] {
            let coordinator = coordinator.clone();
            let req = request(from, to, 100);
            handles.push(tokio::spawn(
                async move { coordinator.transfer(kind, &req).await },
            ));
        }
    }

    let results = tokio::time::timeout(Duration::from_secs(30), join_all(handles))
        .await
        .expect("row locks taken in conflicting order");

    for r in results.into_iter().map(|r| r.unwrap()) {
        assert!(r.success, "{}: {}", r.strategy, r.message);
    }
    // The distributed lock only excludes other distributed transfers, so
    // balances are not checked here; every commit still bumps both rows once.
    let versions: Vec<i64> = rows(&coordinator).await.iter().map(|r| r.1).collect();
    assert_eq!(versions, vec![20, 20]);
    assert_serialized(&ledger.write_intervals());
}

#[tokio::test]
async fn test_pessimistic_lock_timeout_fails_the_transfer() {
    let ledger = Arc::new(MemoryLedger::new().with_lock_timeout(Some(Duration::from_millis(50))));
    let coordinator = coordinator_with(
        ledger.clone(),
        Arc::new(MemoryLockStore::new()),
        &AppConfig::default(),
    );
    coordinator.initialize().await.unwrap();

    // Someone else holds both row locks and never lets go
    let mut blocker = ledger.begin().await.unwrap();
    blocker
        .lock_and_read_pair(&AccountId::from("account_a"), &AccountId::from("account_b"))
        .await
        .unwrap();

    let result = coordinator
        .transfer(
            StrategyKind::Pessimistic,
            &request("account_a", "account_b", AMOUNT),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.reason, Outcome::TransferError);
    assert!(result.message.contains("Timed out waiting for row lock"), "{}", result.message);

    blocker.rollback().await.unwrap();
    assert_eq!(rows(&coordinator).await, vec![(INITIAL, 0), (INITIAL, 0)]);
}

// ============================================================================
// Distributed lock: at most one holder at a time
// ============================================================================

/// Lock store that counts how many callers believe they hold a key at once.
struct HolderCounter {
    inner: MemoryLockStore,
    holders: AtomicUsize,
    max_holders: AtomicUsize,
}

impl HolderCounter {
    fn new() -> Self {
        Self {
            inner: MemoryLockStore::new(),
            holders: AtomicUsize::new(0),
            max_holders: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LockStore for HolderCounter {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let acquired = self.inner.set_if_absent(key, token, ttl).await?;
        if acquired {
            let now = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_holders.fetch_max(now, Ordering::SeqCst);
        }
        Ok(acquired)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), LockStoreError> {
        self.inner.delete(key).await
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, LockStoreError> {
        // Step down before the key frees up, so the next holder never overlaps us
        let owned = self.inner.get(key).await?.as_deref() == Some(token);
        if owned {
            self.holders.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.compare_and_delete(key, token).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<LockEntry>, LockStoreError> {
        self.inner.list(prefix).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distributed_single_holder_under_contention() {
    let counter = Arc::new(HolderCounter::new());
    let (ledger, coordinator) = slow_setup(counter.clone()).await;
    let requests = drain_requests();

    let results = run_concurrently(&coordinator, StrategyKind::Distributed, requests).await;

    assert_eq!(counter.max_holders.load(Ordering::SeqCst), 1);
    assert_eq!(counter.holders.load(Ordering::SeqCst), 0);
    assert!(coordinator.lock_info().await.unwrap().is_empty());

    let successes = results.iter().filter(|r| r.success).count() as i64;
    for r in results.iter().filter(|r| !r.success) {
        assert_eq!(r.reason, Outcome::LockAcquisitionFailed);
    }
    assert_eq!(
        rows(&coordinator).await,
        vec![
            (INITIAL - successes * AMOUNT, successes),
            (INITIAL + successes * AMOUNT, successes)
        ]
    );
    assert_serialized(&ledger.write_intervals());
}

#[tokio::test]
async fn test_distributed_lock_is_pair_wide() {
    let locks = Arc::new(MemoryLockStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let config = AppConfig {
        distributed: DistributedConfig {
            max_attempts: 2,
            retry_delay_ms: 1,
            ..DistributedConfig::default()
        },
        ..AppConfig::default()
    };
    let coordinator = coordinator_with(ledger, locks.clone(), &config);
    coordinator.initialize().await.unwrap();

    locks
        .set_if_absent("transfer_lock:account_a", "held", Duration::from_secs(60))
        .await
        .unwrap();

    // The reverse direction contends for the same key
    let result = coordinator
        .transfer(
            StrategyKind::Distributed,
            &request("account_b", "account_a", AMOUNT),
        )
        .await;
    assert_eq!(result.reason, Outcome::LockAcquisitionFailed);

    let held = coordinator.lock_info().await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].token, "held");
}

// ============================================================================
// Stress harness
// ============================================================================

#[tokio::test]
async fn test_stress_report_every_strategy() {
    for kind in StrategyKind::ALL {
        let (_, coordinator) = setup().await;
        // Leave the accounts dirty; the run must reset them first
        coordinator
            .transfer(kind, &request("account_a", "account_b", 1))
            .await;

        let plan = StressPlan::from_config(&AppConfig::default().stress, coordinator.accounts());
        let report = stress::run(coordinator.clone(), kind, &plan).await.unwrap();

        assert_eq!(report.total_requests, 10);
        assert_eq!(report.success_count, 10, "{}", kind);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.lock_failure_count, 0);
        assert!(report.conserved);
        assert!(report.matches_expected, "{:?}", report.final_balances);
        assert_eq!(report.results.len(), 10);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], kind.as_str());
        assert_eq!(json["final_balances"][0]["balance"], 0);
        assert!(json["total_execution_time_ms"].as_f64().is_some());
    }
}

#[tokio::test]
async fn test_stress_report_counts_rejections() {
    let (_, coordinator) = setup().await;
    let plan = StressPlan {
        requests: 15,
        amount: AMOUNT,
        from: AccountId::from("account_a"),
        to: AccountId::from("account_b"),
    };

    let report = stress::run(coordinator, StrategyKind::Pessimistic, &plan)
        .await
        .unwrap();

    assert_eq!(report.success_count, 10);
    assert_eq!(report.insufficient_funds_count, 5);
    assert_eq!(report.failed_count, 5);
    assert!(report.matches_expected);
}
