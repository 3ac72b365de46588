//! PostgreSQL ledger backend
//!
//! Table `accounts (id, balance, version)`; see [`crate::db::Database::init_schema`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{Account, AccountId, LedgerError, LedgerStore, LedgerTx};

/// PostgreSQL-backed [`LedgerStore`].
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Applied per transaction with `SET LOCAL lock_timeout`.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

fn row_to_account(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: AccountId::from(row.try_get::<String, _>("id")?),
        balance: row.try_get("balance")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        if let Some(limit) = self.lock_timeout {
            // SET does not take bind parameters; the value is an integer we format ourselves
            let stmt = format!("SET LOCAL lock_timeout = '{}ms'", limit.as_millis());
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn initialize(&self, ids: &[AccountId], balance: i64) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM accounts").execute(&mut *tx).await?;

        for id in ids {
            sqlx::query(
                r#"
                INSERT INTO accounts (id, balance, version, created_at, updated_at)
                VALUES ($1, $2, 0, NOW(), NOW())
                "#,
            )
            .bind(id.as_str())
            .bind(balance)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(accounts = ids.len(), balance, "Ledger initialized");
        Ok(())
    }

    async fn balances(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError> {
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT id, balance, version FROM accounts WHERE id = ANY($1) ORDER BY id",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            accounts.push(row_to_account(row)?);
        }
        Ok(accounts)
    }
}

/// Open PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    async fn fetch(&mut self, id: &AccountId, for_update: bool) -> Result<Account, LedgerError> {
        let sql = if for_update {
            "SELECT id, balance, version FROM accounts WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, balance, version FROM accounts WHERE id = $1"
        };

        let row = sqlx::query(sql)
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| LedgerError::from_row_error(e, id))?;

        match row {
            Some(row) => Ok(row_to_account(&row)?),
            None => Err(LedgerError::AccountNotFound(id.clone())),
        }
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn read_pair(
        &mut self,
        a: &AccountId,
        b: &AccountId,
    ) -> Result<(Account, Account), LedgerError> {
        let first = self.fetch(a, false).await?;
        let second = self.fetch(b, false).await?;
        Ok((first, second))
    }

    async fn lock_and_read_pair(
        &mut self,
        first: &AccountId,
        second: &AccountId,
    ) -> Result<(Account, Account), LedgerError> {
        let first = self.fetch(first, true).await?;
        let second = self.fetch(second, true).await?;
        Ok((first, second))
    }

    async fn update_balance(
        &mut self,
        id: &AccountId,
        new_balance: i64,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $1, version = version + 1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(new_balance)
        .bind(id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| LedgerError::from_row_error(e, id))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(id.clone()));
        }
        Ok(())
    }

    async fn compare_and_update_balance(
        &mut self,
        id: &AccountId,
        new_balance: i64,
        expected_version: i64,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $1, version = version + 1, updated_at = NOW()
            WHERE id = $2 AND version = $3
            "#,
        )
        .bind(new_balance)
        .bind(id.as_str())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| LedgerError::from_row_error(e, id))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let PgLedgerTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let PgLedgerTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
