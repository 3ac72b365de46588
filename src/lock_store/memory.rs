//! In-process lock store backed by a DashMap.
//!
//! Each operation runs under the key's shard lock, so set-if-absent and
//! compare-and-delete are atomic with respect to each other.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{LockEntry, LockStore, LockStoreError};

#[derive(Debug, Clone)]
struct Held {
    token: String,
    expires_at: Instant,
}

impl Held {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe, expiry-aware lock store.
pub struct MemoryLockStore {
    entries: DashMap<String, Held>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let now = Instant::now();
        let held = Held {
            token: token.to_string(),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    Ok(false)
                } else {
                    entry.insert(held);
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(held);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|held| held.is_live(now))
            .map(|held| held.token.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), LockStoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, LockStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, held| held.token == token && held.is_live(now))
            .is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<LockEntry>, LockStoreError> {
        let now = Instant::now();
        let mut live: Vec<LockEntry> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .map(|e| LockEntry {
                key: e.key().clone(),
                token: e.value().token.clone(),
                ttl_ms: e.value().expires_at.duration_since(now).as_millis() as i64,
            })
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }
}
