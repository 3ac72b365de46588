//! ledger_locks - concurrency control strategies for balance transfers
//!
//! Moves money between two accounts under concurrent load using one of three
//! strategies, and verifies the ledger stays consistent.
//!
//! # Modules
//!
//! - [`ledger`] - Account rows and transactions (PostgreSQL or in-memory)
//! - [`lock_store`] - Mutual-exclusion keys with TTL (PostgreSQL or in-memory)
//! - [`transfer`] - Pessimistic, optimistic and distributed strategies, coordinator, stress harness
//! - [`gateway`] - HTTP API
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing setup
//! - [`db`] - PostgreSQL pool and schema

pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod lock_store;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use ledger::{Account, AccountId, LedgerError, LedgerStore, MemoryLedger, PgLedger};
pub use lock_store::{LockStore, LockStoreError, MemoryLockStore, PgLockStore};
pub use transfer::{
    StrategyKind, StressReport, TransferCoordinator, TransferError, TransferRequest,
    TransferResult,
};
