use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::ExchangeRate;

#[derive(Debug, Error)]
pub enum RateSourceError {
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("rate source unavailable: {0}")]
    Transport(String),
}

/// Read-only, time-indexed source of exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// All rates for `currency` with an effective date in `[start, end]`.
    async fn rates_in_range(
        &self,
        currency: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>, RateSourceError>;
}
