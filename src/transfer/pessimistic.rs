//! Pessimistic locking
//!
//! Both rows are locked exclusively, in lexicographic id order, for the whole
//! transaction. Concurrent transfers over the same pair queue up behind the
//! row locks and run strictly one at a time; since every caller locks in the
//! same order, two transfers in opposite directions cannot deadlock.

use std::sync::Arc;

use async_trait::async_trait;

use super::strategy::{AttemptLog, Failure, TransferStrategy, check_write_commit};
use super::types::{PairSnapshot, StrategyKind, TransferRequest, TransferResult};
use crate::ledger::LedgerStore;

pub struct PessimisticStrategy {
    ledger: Arc<dyn LedgerStore>,
}

impl PessimisticStrategy {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    async fn attempt(
        &self,
        req: &TransferRequest,
        log: &mut AttemptLog,
    ) -> Result<PairSnapshot, Failure> {
        let mut tx = self.ledger.begin().await?;

        let (first, second) = req.ordered_accounts();
        let (a, b) = tx.lock_and_read_pair(first, second).await?;
        let snapshot = PairSnapshot::assign(req, a, b);

        check_write_commit(tx, req, snapshot, log).await
    }
}

#[async_trait]
impl TransferStrategy for PessimisticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pessimistic
    }

    async fn transfer(&self, req: &TransferRequest) -> TransferResult {
        let mut log = AttemptLog::new(self.kind());
        log.begin_attempt();

        match self.attempt(req, &mut log).await {
            Ok(snapshot) => log.committed(snapshot),
            Err(failure) => log.failed(failure),
        }
    }
}
