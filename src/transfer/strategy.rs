//! Strategy trait and the bookkeeping every strategy shares.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::state::TransferState;
use super::types::{Outcome, PairSnapshot, StrategyKind, TransferRequest, TransferResult};
use crate::ledger::{Account, LedgerError, LedgerTx};

/// One way of moving money between two accounts under concurrency.
///
/// Implementations never return an error: every failure is reported through
/// [`TransferResult::success`] and [`TransferResult::reason`].
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn transfer(&self, req: &TransferRequest) -> TransferResult;
}

/// A failed attempt, with whatever rows it managed to read
#[derive(Debug)]
pub(crate) struct Failure {
    pub error: TransferError,
    pub observed: Option<PairSnapshot>,
}

impl Failure {
    pub fn with_snapshot(error: TransferError, snapshot: PairSnapshot) -> Self {
        Self {
            error,
            observed: Some(snapshot),
        }
    }
}

impl From<TransferError> for Failure {
    fn from(error: TransferError) -> Self {
        Self {
            error,
            observed: None,
        }
    }
}

impl From<LedgerError> for Failure {
    fn from(e: LedgerError) -> Self {
        TransferError::from(e).into()
    }
}

/// Counters and state for a single `transfer` call
pub(crate) struct AttemptLog {
    kind: StrategyKind,
    started: Instant,
    state: TransferState,
    attempts: u32,
    conflicts: u32,
}

impl AttemptLog {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
            state: TransferState::Pending,
            attempts: 0,
            conflicts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start another attempt. After a conflict this is the retry edge.
    pub fn begin_attempt(&mut self) {
        if self.state == TransferState::Conflict {
            self.transition(TransferState::Pending);
        }
        self.attempts += 1;
    }

    pub fn record_conflict(&mut self) {
        self.conflicts += 1;
        self.transition(TransferState::Conflict);
    }

    /// Count lock acquisition tries as attempts
    pub fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    pub fn transition(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(strategy = %self.kind, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    pub fn committed(mut self, snapshot: PairSnapshot) -> TransferResult {
        self.transition(TransferState::Committed);
        let elapsed = self.started.elapsed();
        info!(
            strategy = %self.kind,
            from = %snapshot.from.id,
            to = %snapshot.to.id,
            from_balance = snapshot.from.balance,
            to_balance = snapshot.to.balance,
            attempts = self.attempts,
            conflicts = self.conflicts,
            elapsed_us = elapsed.as_micros() as u64,
            "Transfer committed"
        );
        let mut result = TransferResult::new(
            self.kind,
            Outcome::Committed,
            "Transfer successful".to_string(),
            Some(&snapshot),
        );
        self.stamp(&mut result);
        result
    }

    pub fn failed(mut self, failure: Failure) -> TransferResult {
        let Failure { error, observed } = failure;
        let terminal = match error {
            TransferError::InsufficientFunds { .. } => TransferState::InsufficientFunds,
            _ => TransferState::Error,
        };
        // Retries exhausted: give up from the last CONFLICT
        if self.state == TransferState::Conflict {
            self.transition(TransferState::Pending);
        }
        self.transition(terminal);

        if terminal == TransferState::InsufficientFunds {
            info!(strategy = %self.kind, error = %error, "Transfer rejected");
        } else {
            warn!(
                strategy = %self.kind,
                code = error.code(),
                attempts = self.attempts,
                conflicts = self.conflicts,
                error = %error,
                "Transfer failed"
            );
        }

        let mut result =
            TransferResult::new(self.kind, error.outcome(), error.to_string(), observed.as_ref());
        self.stamp(&mut result);
        result
    }

    fn stamp(&self, result: &mut TransferResult) {
        result.attempts = self.attempts;
        result.conflicts = self.conflicts;
        result.elapsed = self.started.elapsed();
    }
}

/// New balances for `snapshot` after moving `req.amount`, or why not.
pub(crate) fn plan_balances(
    req: &TransferRequest,
    snapshot: &PairSnapshot,
) -> Result<(i64, i64), TransferError> {
    if snapshot.from.balance < req.amount() {
        return Err(TransferError::InsufficientFunds {
            account: snapshot.from.id.clone(),
            available: snapshot.from.balance,
            requested: req.amount(),
        });
    }
    let new_to = snapshot
        .to
        .balance
        .checked_add(req.amount())
        .ok_or_else(|| TransferError::Overflow(snapshot.to.id.clone()))?;
    Ok((snapshot.from.balance - req.amount(), new_to))
}

/// Validate funds on rows already read inside `tx`, then write both rows
/// unconditionally and commit. Shared by the strategies that have already
/// excluded concurrent writers by the time they read.
pub(crate) async fn check_write_commit(
    mut tx: Box<dyn LedgerTx>,
    req: &TransferRequest,
    snapshot: PairSnapshot,
    log: &mut AttemptLog,
) -> Result<PairSnapshot, Failure> {
    let (new_from, new_to) = match plan_balances(req, &snapshot) {
        Ok(balances) => balances,
        Err(e) => {
            rollback_quietly(tx).await;
            return Err(Failure::with_snapshot(e, snapshot));
        }
    };
    log.transition(TransferState::Acquired);

    for (row, new_balance) in ordered_writes(&snapshot, new_from, new_to) {
        tx.update_balance(&row.id, new_balance).await?;
    }
    tx.commit().await?;

    Ok(snapshot.after_write(new_from, new_to))
}

/// Pair each row with its new balance, in id order. Every writer touches
/// rows in this order, so a write can never wait on a row lock held by a
/// transfer running the other way.
pub(crate) fn ordered_writes(
    snapshot: &PairSnapshot,
    new_from: i64,
    new_to: i64,
) -> [(Account, i64); 2] {
    if snapshot.from.id <= snapshot.to.id {
        [(snapshot.from.clone(), new_from), (snapshot.to.clone(), new_to)]
    } else {
        [(snapshot.to.clone(), new_to), (snapshot.from.clone(), new_from)]
    }
}

/// Roll back on a path that is already failing; the original error wins.
pub(crate) async fn rollback_quietly(tx: Box<dyn LedgerTx>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}
