//! Lock table in PostgreSQL
//!
//! Acquisition is an upsert that only overwrites an expired row; release is a
//! token-guarded DELETE. Both are single statements, hence atomic.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{LockEntry, LockStore, LockStoreError};

pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfer_locks_tb (lock_key, token, expires_at)
            VALUES ($1, $2, NOW() + INTERVAL '1 millisecond' * $3)
            ON CONFLICT (lock_key) DO UPDATE
            SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
            WHERE transfer_locks_tb.expires_at <= NOW()
            "#,
        )
        .bind(key)
        .bind(token)
        .bind(ttl.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        let token = sqlx::query_scalar::<_, String>(
            "SELECT token FROM transfer_locks_tb WHERE lock_key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn delete(&self, key: &str) -> Result<(), LockStoreError> {
        sqlx::query("DELETE FROM transfer_locks_tb WHERE lock_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, LockStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM transfer_locks_tb
            WHERE lock_key = $1 AND token = $2 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<LockEntry>, LockStoreError> {
        // left() rather than LIKE: key prefixes contain '_'
        let rows = sqlx::query(
            r#"
            SELECT lock_key, token,
                   (EXTRACT(EPOCH FROM (expires_at - NOW())) * 1000)::BIGINT AS ttl_ms
            FROM transfer_locks_tb
            WHERE left(lock_key, length($1)) = $1 AND expires_at > NOW()
            ORDER BY lock_key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut locks = Vec::with_capacity(rows.len());
        for row in rows {
            locks.push(LockEntry {
                key: row.try_get("lock_key")?,
                token: row.try_get("token")?,
                ttl_ms: row.try_get("ttl_ms")?,
            });
        }
        Ok(locks)
    }
}
