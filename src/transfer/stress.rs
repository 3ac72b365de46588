//! Stress harness
//!
//! Fires N identical transfers at one strategy concurrently, waits for all of
//! them, and checks the final ledger against what a correct serial execution
//! would have produced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Serialize, Serializer};
use tracing::{error, info};

use super::coordinator::TransferCoordinator;
use super::error::TransferError;
use super::types::{Outcome, StrategyKind, TransferRequest, TransferResult};
use crate::config::StressConfig;
use crate::ledger::{Account, AccountId};

#[derive(Debug, Clone)]
pub struct StressPlan {
    pub requests: usize,
    pub amount: i64,
    pub from: AccountId,
    pub to: AccountId,
}

impl StressPlan {
    /// `requests` transfers of `amount` from the first configured account to
    /// the second
    pub fn from_config(config: &StressConfig, accounts: &[AccountId; 2]) -> Self {
        Self {
            requests: config.requests,
            amount: config.amount,
            from: accounts[0].clone(),
            to: accounts[1].clone(),
        }
    }
}

/// Balance and version a correct execution must end with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedBalance {
    pub id: AccountId,
    pub balance: i64,
    pub version: i64,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub strategy: StrategyKind,
    pub total_requests: usize,
    pub success_count: usize,
    pub failed_count: usize,
    /// Transfers that needed more than one attempt
    pub retried_count: usize,
    /// Version conflicts summed over all transfers
    pub conflict_count: u64,
    pub lock_failure_count: usize,
    pub insufficient_funds_count: usize,
    #[serde(rename = "total_execution_time_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub final_balances: Vec<Account>,
    pub expected_balances: Vec<ExpectedBalance>,
    /// Sum of balances unchanged by the run
    pub conserved: bool,
    /// Final balances and versions equal the expected ones
    pub matches_expected: bool,
    pub results: Vec<TransferResult>,
}

/// Expected final rows when every transfer moves `amount` from `plan.from`
/// starting at `initial_balance`: as many succeed as the source can fund.
pub fn expected_balances(plan: &StressPlan, initial_balance: i64) -> Vec<ExpectedBalance> {
    let fundable = if plan.amount > 0 {
        (initial_balance / plan.amount).max(0) as usize
    } else {
        0
    };
    let successes = plan.requests.min(fundable) as i64;
    let moved = successes * plan.amount;

    let mut expected = vec![
        ExpectedBalance {
            id: plan.from.clone(),
            balance: initial_balance - moved,
            version: successes,
        },
        ExpectedBalance {
            id: plan.to.clone(),
            balance: initial_balance + moved,
            version: successes,
        },
    ];
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    expected
}

/// Run `plan` against `kind` with every request in flight at once.
///
/// Accounts are reset first, so the run always starts from the initial balance.
pub async fn run(
    coordinator: Arc<TransferCoordinator>,
    kind: StrategyKind,
    plan: &StressPlan,
) -> Result<StressReport, TransferError> {
    let request = TransferRequest::new(plan.from.clone(), plan.to.clone(), plan.amount)?;
    let initial = coordinator.initialize().await?;
    let initial_total: i64 = initial.iter().map(|a| a.balance).sum();

    info!(
        strategy = %kind,
        requests = plan.requests,
        amount = plan.amount,
        "Stress run started"
    );
    let started = Instant::now();

    let handles: Vec<_> = (0..plan.requests)
        .map(|_| {
            let coordinator = coordinator.clone();
            let request = request.clone();
            tokio::spawn(async move { coordinator.transfer(kind, &request).await })
        })
        .collect();

    let results: Vec<TransferResult> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|e| {
                error!(strategy = %kind, error = %e, "Transfer task failed");
                TransferResult::rejected(kind, &TransferError::Internal(e.to_string()))
            })
        })
        .collect();

    let elapsed = started.elapsed();
    let final_balances = coordinator.balances().await?;
    let expected = expected_balances(plan, coordinator.initial_balance());

    let final_total: i64 = final_balances.iter().map(|a| a.balance).sum();
    let matches_expected = final_balances.len() == expected.len()
        && final_balances.iter().zip(&expected).all(|(actual, want)| {
            actual.id == want.id && actual.balance == want.balance && actual.version == want.version
        });

    let report = StressReport {
        strategy: kind,
        total_requests: plan.requests,
        success_count: results.iter().filter(|r| r.success).count(),
        failed_count: results.iter().filter(|r| !r.success).count(),
        retried_count: results.iter().filter(|r| r.conflicts > 0).count(),
        conflict_count: results.iter().map(|r| r.conflicts as u64).sum(),
        lock_failure_count: count_reason(&results, Outcome::LockAcquisitionFailed),
        insufficient_funds_count: count_reason(&results, Outcome::InsufficientFunds),
        elapsed,
        final_balances,
        expected_balances: expected,
        conserved: final_total == initial_total,
        matches_expected,
        results,
    };

    info!(
        strategy = %kind,
        success = report.success_count,
        failed = report.failed_count,
        conflicts = report.conflict_count,
        lock_failures = report.lock_failure_count,
        elapsed_ms = elapsed.as_millis() as u64,
        conserved = report.conserved,
        matches_expected = report.matches_expected,
        "Stress run finished"
    );

    Ok(report)
}

fn count_reason(results: &[TransferResult], reason: Outcome) -> usize {
    results.iter().filter(|r| r.reason == reason).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(requests: usize, amount: i64) -> StressPlan {
        StressPlan {
            requests,
            amount,
            from: AccountId::from("account_a"),
            to: AccountId::from("account_b"),
        }
    }

    #[test]
    fn test_expected_when_all_fundable() {
        let expected = expected_balances(&plan(10, 10_000), 100_000);
        assert_eq!(expected[0].balance, 0);
        assert_eq!(expected[1].balance, 200_000);
        assert_eq!(expected[0].version, 10);
        assert_eq!(expected[1].version, 10);
    }

    #[test]
    fn test_expected_caps_at_source_balance() {
        let expected = expected_balances(&plan(12, 10_000), 100_000);
        assert_eq!(expected[0].balance, 0);
        assert_eq!(expected[0].version, 10);

        let expected = expected_balances(&plan(5, 30_000), 100_000);
        assert_eq!(expected[0].balance, 10_000);
        assert_eq!(expected[1].balance, 190_000);
        assert_eq!(expected[1].version, 3);
    }

    #[test]
    fn test_expected_sorted_by_id() {
        let mut p = plan(1, 1);
        std::mem::swap(&mut p.from, &mut p.to);
        let expected = expected_balances(&p, 10);
        assert_eq!(expected[0].id.as_str(), "account_a");
        assert_eq!(expected[0].balance, 11);
        assert_eq!(expected[1].balance, 9);
    }
}
