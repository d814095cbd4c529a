use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable keyed store for transactions.
///
/// Implementations must apply `update_status` atomically per row: the
/// transition check and the write cannot be split by a concurrent writer.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists a new transaction and returns it as stored.
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    /// Sets `status`. The first move to `COMPLETED` stamps `processed_at`;
    /// later calls never overwrite it.
    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> RepositoryResult<()>;

    /// Newest first by `created_at`.
    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>>;

    /// Cheap liveness round-trip used by health checks.
    async fn ping(&self) -> RepositoryResult<()>;
}
