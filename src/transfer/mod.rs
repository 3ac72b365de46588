//! Two-account transfers under three concurrency-control strategies
//!
//! Every strategy performs the same logical operation: move `amount` from one
//! account to the other if the source can fund it, committing both writes
//! atomically. They differ only in how concurrent transfers over the same pair
//! are kept from interfering.
//!
//! | Strategy      | Mutual exclusion                     | On contention            |
//! |---------------|--------------------------------------|--------------------------|
//! | pessimistic   | row locks, taken in id order         | wait on the lock         |
//! | optimistic    | none, version-checked writes         | retry with backoff       |
//! | distributed   | external lock key per account pair   | poll the key, then give up |
//!
//! # Invariants
//!
//! 1. **Conservation**: the sum of both balances never changes.
//! 2. **Non-negativity**: no committed balance is below zero.
//! 3. **Atomicity**: both rows change in one commit, or neither does.
//! 4. **Versioning**: each committed write bumps the row's version by one.

pub mod coordinator;
pub mod distributed;
pub mod error;
pub mod optimistic;
pub mod pessimistic;
pub mod state;
pub mod strategy;
pub mod stress;
pub mod types;

pub use coordinator::{StrategyInfo, TransferCoordinator};
pub use distributed::DistributedStrategy;
pub use error::TransferError;
pub use optimistic::OptimisticStrategy;
pub use pessimistic::PessimisticStrategy;
pub use state::TransferState;
pub use strategy::TransferStrategy;
pub use stress::{ExpectedBalance, StressPlan, StressReport};
pub use types::{Outcome, PairSnapshot, StrategyKind, TransferRequest, TransferResult};
