//! Transaction domain entity.
//! Framework-agnostic representation of a purchase transaction and its
//! completion lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::validation::{self, ValidationError, ValidationResult};

/// Lifecycle status of a transaction.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// Whether a record currently in `self` may be moved to `next`.
    /// Re-applying the current status is always allowed.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            TransactionStatus::Pending => true,
            TransactionStatus::Processing => next.is_terminal(),
            TransactionStatus::Completed | TransactionStatus::Failed => false,
        }
    }

    /// Statuses from which `self` may be reached, itself included.
    pub fn allowed_predecessors(&self) -> Vec<TransactionStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PROCESSING" => Ok(TransactionStatus::Processing),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(ValidationError::new(
                "status",
                format!(
                    "unknown status '{}', expected one of PENDING, PROCESSING, COMPLETED, FAILED",
                    other
                ),
            )),
        }
    }
}

/// Domain entity representing a purchase transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub description: String,
    pub transaction_date: NaiveDate,
    #[schema(value_type = String, example = "100.00")]
    pub amount_usd: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
}

impl Transaction {
    /// Builds a `PENDING` transaction with a fresh identifier. `today` is the
    /// reference date for the no-future-dates rule.
    pub fn new(
        description: &str,
        transaction_date: NaiveDate,
        amount_usd: &BigDecimal,
        today: NaiveDate,
    ) -> ValidationResult<Self> {
        let description = validation::validate_description(description)?;
        let amount_usd = validation::validate_amount(amount_usd)?;
        validation::validate_transaction_date(transaction_date, today)?;

        Ok(Self {
            id: Uuid::new_v4(),
            description,
            transaction_date,
            amount_usd,
            created_at: Utc::now(),
            processed_at: None,
            status: TransactionStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let today = date(2024, 6, 1);
        let tx = Transaction::new("Groceries", date(2024, 5, 30), &BigDecimal::from(42), today)
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.processed_at.is_none());
        assert!(!tx.id.is_nil());
        assert_eq!(tx.amount_usd.to_string(), "42.00");
    }

    #[test]
    fn test_new_transaction_rejects_future_date() {
        let today = date(2024, 6, 1);
        let err = Transaction::new("Groceries", date(2024, 6, 2), &BigDecimal::from(1), today)
            .unwrap_err();
        assert_eq!(err.field, "transaction_date");
    }

    #[test]
    fn test_status_parsing_is_closed() {
        assert_eq!(
            "completed".parse::<TransactionStatus>().unwrap(),
            TransactionStatus::Completed
        );
        assert_eq!(
            " PROCESSING ".parse::<TransactionStatus>().unwrap(),
            TransactionStatus::Processing
        );
        assert!("DONE".parse::<TransactionStatus>().is_err());
        assert!("".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&TransactionStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn test_transitions() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_allowed_predecessors_of_completed() {
        use TransactionStatus::*;

        let from = Completed.allowed_predecessors();
        assert_eq!(from, vec![Pending, Processing, Completed]);
        assert_eq!(Pending.allowed_predecessors(), vec![Pending]);
    }
}
