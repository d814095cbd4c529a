use std::sync::Arc;
use uuid::Uuid;

use crate::domain::currency::{rate_window, select_rate};
use crate::domain::{ConversionError, CurrencyConversion};
use crate::error::AppError;
use crate::ports::{RateSource, TransactionRepository};

/// Re-expresses a stored transaction's USD amount in another currency using
/// the most recent rate inside its six-month window.
#[derive(Clone)]
pub struct CurrencyService {
    repository: Arc<dyn TransactionRepository>,
    rates: Arc<dyn RateSource>,
}

impl CurrencyService {
    pub fn new(repository: Arc<dyn TransactionRepository>, rates: Arc<dyn RateSource>) -> Self {
        Self { repository, rates }
    }

    pub async fn convert(
        &self,
        transaction_id: Uuid,
        target_currency: &str,
    ) -> Result<CurrencyConversion, AppError> {
        let currency = target_currency.trim();
        if currency.is_empty() {
            return Err(ConversionError::InvalidCurrency.into());
        }

        let tx = self.repository.get_by_id(transaction_id).await?;
        let (start, end) = rate_window(tx.transaction_date)?;

        let rates = self.rates.rates_in_range(currency, start, end).await?;
        tracing::debug!(
            transaction_id = %tx.id,
            currency,
            candidates = rates.len(),
            "Fetched exchange rate candidates"
        );

        let rate =
            select_rate(&rates, tx.transaction_date).ok_or(ConversionError::NoValidExchangeRate)?;

        let conversion = CurrencyConversion::new(&tx, currency, rate)?;
        conversion.validate()?;
        Ok(conversion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransactionRepository;
    use crate::domain::{ExchangeRate, Transaction};
    use crate::ports::RateSourceError;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Returns canned rates for one currency and records the queried window.
    struct StubRates {
        currency: &'static str,
        rates: Vec<ExchangeRate>,
        queried: Mutex<Option<(NaiveDate, NaiveDate)>>,
    }

    #[async_trait]
    impl RateSource for StubRates {
        async fn rates_in_range(
            &self,
            currency: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<ExchangeRate>, RateSourceError> {
            *self.queried.lock().unwrap() = Some((start, end));
            if currency != self.currency {
                return Err(RateSourceError::UnknownCurrency(currency.to_string()));
            }
            Ok(self.rates.clone())
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn rate(value: &str, on: &str) -> ExchangeRate {
        ExchangeRate {
            currency: "Euro Zone-Euro".to_string(),
            rate: BigDecimal::from_str(value).unwrap(),
            effective_date: date(on),
        }
    }

    async fn setup(rates: Vec<ExchangeRate>) -> (CurrencyService, Arc<StubRates>, Uuid) {
        let repo = Arc::new(InMemoryTransactionRepository::new());
        let tx = Transaction::new(
            "Laptop",
            date("2024-01-10"),
            &BigDecimal::from_str("100.00").unwrap(),
            date("2024-06-01"),
        )
        .unwrap();
        let id = repo.insert(&tx).await.unwrap().id;
        let stub = Arc::new(StubRates {
            currency: "Euro Zone-Euro",
            rates,
            queried: Mutex::new(None),
        });
        (CurrencyService::new(repo, stub.clone()), stub, id)
    }

    #[tokio::test]
    async fn test_converts_with_latest_rate_in_window() {
        let (svc, stub, id) = setup(vec![
            rate("0.8500", "2024-01-09"),
            rate("0.9000", "2023-12-31"),
        ])
        .await;

        let conversion = svc.convert(id, "Euro Zone-Euro").await.unwrap();

        assert_eq!(conversion.converted_amount.to_string(), "85.0000");
        assert_eq!(conversion.exchange_date, date("2024-01-09"));
        assert_eq!(
            *stub.queried.lock().unwrap(),
            Some((date("2023-07-10"), date("2024-01-10")))
        );
    }

    #[tokio::test]
    async fn test_unknown_currency_is_invalid_currency() {
        let (svc, _, id) = setup(vec![rate("0.85", "2024-01-09")]).await;
        let err = svc.convert(id, "Atlantis-Shell").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCurrency(_)));
    }

    #[tokio::test]
    async fn test_blank_currency_is_invalid_currency() {
        let (svc, stub, id) = setup(vec![]).await;
        let err = svc.convert(id, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCurrency(_)));
        assert!(stub.queried.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_known_currency_without_rates_has_no_valid_rate() {
        let (svc, _, id) = setup(vec![]).await;
        let err = svc.convert(id, "Euro Zone-Euro").await.unwrap_err();
        assert!(matches!(err, AppError::NoValidExchangeRate));
    }

    #[tokio::test]
    async fn test_future_rate_is_rejected() {
        let (svc, _, id) = setup(vec![rate("0.85", "2024-01-11")]).await;
        let err = svc.convert(id, "Euro Zone-Euro").await.unwrap_err();
        assert!(matches!(err, AppError::NoValidExchangeRate));
    }

    #[tokio::test]
    async fn test_rate_before_window_is_rejected() {
        let (svc, _, id) = setup(vec![rate("0.85", "2023-07-09")]).await;
        let err = svc.convert(id, "Euro Zone-Euro").await.unwrap_err();
        assert!(matches!(err, AppError::NoValidExchangeRate));
    }

    #[tokio::test]
    async fn test_missing_transaction_is_not_found() {
        let (svc, _, _) = setup(vec![]).await;
        let err = svc.convert(Uuid::new_v4(), "Euro Zone-Euro").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
