//! Mutual-exclusion key store
//!
//! A key holds at most one token at a time. A key whose TTL has passed is
//! treated as absent everywhere, so a holder that dies without releasing
//! stops blocking others once the TTL runs out.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use memory::MemoryLockStore;
pub use postgres::PgLockStore;

#[derive(Error, Debug)]
pub enum LockStoreError {
    #[error("Lock store database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A live lock, for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LockEntry {
    pub key: String,
    pub token: String,
    /// Remaining time to live in milliseconds
    pub ttl_ms: i64,
}

#[async_trait]
pub trait LockStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store `token` under `key` with `ttl`, only if the key is absent.
    /// Returns `true` when the caller now holds the key.
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError>;

    /// Unconditional delete
    async fn delete(&self, key: &str) -> Result<(), LockStoreError>;

    /// Delete `key` only if it still holds `token`, in a single atomic step.
    /// Returns `true` if something was deleted.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, LockStoreError>;

    /// Live locks whose key starts with `prefix`, ordered by key
    async fn list(&self, prefix: &str) -> Result<Vec<LockEntry>, LockStoreError>;
}
