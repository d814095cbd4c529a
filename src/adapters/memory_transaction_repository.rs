//! In-process TransactionRepository used by tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    rows: RwLock<HashMap<Uuid, Transaction>>,
    failing_updates: AtomicUsize,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `update_status` fail with a transient
    /// database error.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut stored = tx.clone();
        stored.created_at = Utc::now();
        self.rows.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> RepositoryResult<()> {
        if self.take_injected_failure() {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.write().await;
        let tx = rows.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if !tx.status.can_transition_to(status) {
            return Err(RepositoryError::InvalidTransition {
                id,
                from: tx.status,
                to: status,
            });
        }
        tx.status = status;
        if status == TransactionStatus::Completed && tx.processed_at.is_none() {
            tx.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        let mut all: Vec<Transaction> = self.rows.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
