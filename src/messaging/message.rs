use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Transaction;

/// Envelope published when a transaction is created, asking the pipeline to
/// complete it. Keyed by `id` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub id: Uuid,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub amount_usd: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl CompletionMessage {
    /// Publish-only health probe. Carries the nil id so consumers can tell it
    /// apart from real completions.
    pub fn probe() -> Self {
        Self {
            id: Uuid::nil(),
            description: "health-probe".to_string(),
            transaction_date: Utc::now().date_naive(),
            amount_usd: BigDecimal::from(0),
            created_at: Utc::now(),
        }
    }

    pub fn is_probe(&self) -> bool {
        self.id.is_nil()
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

impl From<&Transaction> for CompletionMessage {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            description: tx.description.clone(),
            transaction_date: tx.transaction_date,
            amount_usd: tx.amount_usd.clone(),
            created_at: tx.created_at,
        }
    }
}
