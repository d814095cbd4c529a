use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::error::AppError;
use crate::messaging::{CompletionHandler, CompletionMessage, MessagePublisher};
use crate::metrics;
use crate::ports::TransactionRepository;

/// Extra publish attempts after the first one fails.
pub const DEFAULT_PUBLISH_RETRIES: u32 = 3;
pub const DEFAULT_PUBLISH_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishRetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for PublishRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_PUBLISH_RETRIES,
            delay: DEFAULT_PUBLISH_RETRY_DELAY,
        }
    }
}

/// Result of a create: the stored transaction plus whether its completion
/// message reached the queue.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub transaction: Transaction,
    pub queued: bool,
}

/// Lifecycle coordinator. The repository is the source of truth; the queue
/// only triggers eventual completion.
#[derive(Clone)]
pub struct TransactionService {
    repository: Arc<dyn TransactionRepository>,
    publisher: Arc<dyn MessagePublisher>,
    retry: PublishRetryPolicy,
}

impl TransactionService {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            repository,
            publisher,
            retry: PublishRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: PublishRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates and persists a new `PENDING` transaction, then publishes its
    /// completion message. A publish that keeps failing does not fail the
    /// create.
    pub async fn create(
        &self,
        description: &str,
        transaction_date: NaiveDate,
        amount_usd: &BigDecimal,
    ) -> Result<CreateOutcome, AppError> {
        let today = Utc::now().date_naive();
        let draft = Transaction::new(description, transaction_date, amount_usd, today)?;
        let transaction = self.repository.insert(&draft).await?;
        tracing::info!(transaction_id = %transaction.id, "Transaction created");

        let queued = self
            .publish_with_retry(&CompletionMessage::from(&transaction))
            .await;

        Ok(CreateOutcome { transaction, queued })
    }

    async fn publish_with_retry(&self, message: &CompletionMessage) -> bool {
        let attempts = self.retry.max_retries + 1;

        for attempt in 1..=attempts {
            let published = self.publisher.publish(message).await;
            match &published {
                Ok(()) => metrics::record_published(),
                Err(_) => metrics::record_publish_error(),
            }
            match published {
                Ok(()) => return true,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        transaction_id = %message.id,
                        attempt,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        transaction_id = %message.id,
                        attempts,
                        error = %e,
                        "Publish retries exhausted, transaction left PENDING"
                    );
                }
            }
        }
        false
    }

    pub async fn update_status(&self, id: Uuid, status: TransactionStatus) -> Result<(), AppError> {
        self.repository.update_status(id, status).await?;
        tracing::info!(transaction_id = %id, status = %status, "Transaction status updated");
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Transaction, AppError> {
        Ok(self.repository.get_by_id(id).await?)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repository.list(limit, offset).await?)
    }
}

#[async_trait]
impl CompletionHandler for TransactionService {
    async fn handle(&self, message: &CompletionMessage) -> Result<(), AppError> {
        self.update_status(message.id, TransactionStatus::Completed).await
    }
}
