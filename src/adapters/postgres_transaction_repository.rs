//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{TransactionRow, TRANSACTION_COLUMNS, parse_status};
use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (id, description, transaction_date, amount_usd, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id)
        .bind(&tx.description)
        .bind(tx.transaction_date)
        .bind(&tx.amount_usd)
        .bind(tx.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound(id))?.into_domain()
    }

    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> RepositoryResult<()> {
        let allowed_from: Vec<String> = status
            .allowed_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // Transition check and write in one statement; the row lock taken by
        // UPDATE serializes concurrent writers on the same id.
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1,
                processed_at = CASE
                    WHEN $1 = 'COMPLETED' AND processed_at IS NULL THEN NOW()
                    ELSE processed_at
                END
            WHERE id = $2 AND status = ANY($3)
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .bind(&allowed_from)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(RepositoryError::NotFound(id)),
            Some(raw) => Err(RepositoryError::InvalidTransition {
                id,
                from: parse_status(&raw)?,
                to: status,
            }),
        }
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            TRANSACTION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
