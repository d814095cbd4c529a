use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::RepositoryError;

pub const TRANSACTION_COLUMNS: &str =
    "id, description, transaction_date, amount_usd, created_at, processed_at, status";

/// Row shape of the `transactions` table.
#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub amount_usd: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl TransactionRow {
    pub fn into_domain(self) -> Result<Transaction, RepositoryError> {
        Ok(Transaction {
            id: self.id,
            description: self.description,
            transaction_date: self.transaction_date,
            amount_usd: self.amount_usd,
            created_at: self.created_at,
            processed_at: self.processed_at,
            status: parse_status(&self.status)?,
        })
    }
}

pub fn parse_status(raw: &str) -> Result<TransactionStatus, RepositoryError> {
    raw.parse::<TransactionStatus>()
        .map_err(|e| RepositoryError::Database(sqlx::Error::Decode(Box::new(e))))
}
