//! Optimistic concurrency control
//!
//! Rows are read without locks. Each write is conditioned on the version seen
//! at read time; a write that matches no row means another transfer committed
//! in between, so the whole attempt is rolled back and retried after an
//! exponential backoff. Insufficient funds and storage failures end the call
//! immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::error::TransferError;
use super::state::TransferState;
use super::strategy::{
    AttemptLog, Failure, TransferStrategy, ordered_writes, plan_balances, rollback_quietly,
};
use super::types::{PairSnapshot, StrategyKind, TransferRequest, TransferResult};
use crate::config::OptimisticConfig;
use crate::ledger::{Account, LedgerStore, LedgerTx};

pub struct OptimisticStrategy {
    ledger: Arc<dyn LedgerStore>,
    config: OptimisticConfig,
}

impl OptimisticStrategy {
    pub fn new(ledger: Arc<dyn LedgerStore>, config: OptimisticConfig) -> Self {
        Self { ledger, config }
    }

    async fn attempt(
        &self,
        req: &TransferRequest,
        log: &mut AttemptLog,
    ) -> Result<PairSnapshot, Failure> {
        let mut tx = self.ledger.begin().await?;

        let (a, b) = tx.read_pair(req.from(), req.to()).await?;
        let snapshot = PairSnapshot::assign(req, a, b);

        let (new_from, new_to) = match plan_balances(req, &snapshot) {
            Ok(balances) => balances,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(Failure::with_snapshot(e, snapshot));
            }
        };
        log.transition(TransferState::Acquired);

        for (row, new_balance) in ordered_writes(&snapshot, new_from, new_to) {
            if !self.write_if_unchanged(&mut *tx, &row, new_balance).await? {
                rollback_quietly(tx).await;
                let conflict = TransferError::VersionConflict(row.id.clone());
                return Err(Failure::with_snapshot(conflict, snapshot));
            }
        }

        tx.commit().await?;
        Ok(snapshot.after_write(new_from, new_to))
    }

    async fn write_if_unchanged(
        &self,
        tx: &mut dyn LedgerTx,
        row: &Account,
        new_balance: i64,
    ) -> Result<bool, Failure> {
        let matched = tx
            .compare_and_update_balance(&row.id, new_balance, row.version)
            .await?;
        Ok(matched == 1)
    }
}

#[async_trait]
impl TransferStrategy for OptimisticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimistic
    }

    async fn transfer(&self, req: &TransferRequest) -> TransferResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut log = AttemptLog::new(self.kind());
        let mut last_observed = None;

        for attempt_index in 0..max_attempts {
            log.begin_attempt();

            match self.attempt(req, &mut log).await {
                Ok(snapshot) => return log.committed(snapshot),
                Err(failure) if failure.error.is_retryable() => {
                    log.record_conflict();
                    last_observed = failure.observed;

                    if attempt_index + 1 < max_attempts {
                        let delay = self.config.backoff(attempt_index);
                        debug!(
                            attempt = log.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %failure.error,
                            "Version conflict, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(failure) => return log.failed(failure),
            }
        }

        log.failed(Failure {
            error: TransferError::ConflictRetriesExhausted {
                attempts: max_attempts,
            },
            observed: last_observed,
        })
    }
}
