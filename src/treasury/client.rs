use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ExchangeRate;
use crate::ports::{RateSource, RateSourceError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RANGE_PAGE_SIZE: &str = "1000";
const FIELDS: &str = "country_currency_desc,exchange_rate,record_date";

#[derive(Error, Debug)]
pub enum TreasuryError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid response from Treasury API: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<TreasuryError> for RateSourceError {
    fn from(err: TreasuryError) -> Self {
        RateSourceError::Transport(err.to_string())
    }
}

/// Envelope of the Fiscal Data `rates_of_exchange` dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesResponse {
    pub data: Vec<RateRecord>,
}

/// All fields arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRecord {
    pub country_currency_desc: String,
    pub exchange_rate: String,
    pub record_date: String,
}

impl RateRecord {
    fn to_exchange_rate(&self) -> Result<ExchangeRate, TreasuryError> {
        let rate = BigDecimal::from_str(self.exchange_rate.trim()).map_err(|e| {
            TreasuryError::InvalidResponse(format!("exchange_rate '{}': {}", self.exchange_rate, e))
        })?;
        let effective_date = NaiveDate::parse_from_str(self.record_date.trim(), "%Y-%m-%d")
            .map_err(|e| {
                TreasuryError::InvalidResponse(format!("record_date '{}': {}", self.record_date, e))
            })?;
        Ok(ExchangeRate {
            currency: self.country_currency_desc.clone(),
            rate,
            effective_date,
        })
    }
}

/// HTTP client for the U.S. Treasury Fiscal Data exchange-rate API. Currency
/// identifiers are `country_currency_desc` values such as `Euro Zone-Euro`.
#[derive(Clone)]
pub struct TreasuryClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl TreasuryClient {
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    /// Opens after `failure_threshold` consecutive failures and stays open for
    /// a jittered period between `reset_timeout_secs` and twice that.
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        TreasuryClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn fetch(
        &self,
        filter: String,
        page_size: &'static str,
    ) -> Result<Vec<RateRecord>, TreasuryError> {
        let client = self.client.clone();
        let url = self.base_url.trim_end_matches('/').to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .get(&url)
                    .query(&[
                        ("fields", FIELDS),
                        ("filter", filter.as_str()),
                        ("sort", "-record_date"),
                        ("page[size]", page_size),
                    ])
                    .send()
                    .await?
                    .error_for_status()?;

                let body = response.json::<RatesResponse>().await?;
                Ok::<_, TreasuryError>(body.data)
            })
            .await;

        match result {
            Ok(records) => Ok(records),
            Err(FailsafeError::Rejected) => Err(TreasuryError::CircuitBreakerOpen(
                "Treasury API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Whether the dataset holds any record at all for `currency`.
    pub async fn currency_exists(&self, currency: &str) -> Result<bool, TreasuryError> {
        let records = self
            .fetch(format!("country_currency_desc:eq:{}", currency), "1")
            .await?;
        Ok(!records.is_empty())
    }
}

#[async_trait]
impl RateSource for TreasuryClient {
    async fn rates_in_range(
        &self,
        currency: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>, RateSourceError> {
        let filter = format!(
            "country_currency_desc:eq:{},record_date:gte:{},record_date:lte:{}",
            currency,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let records = self.fetch(filter, RANGE_PAGE_SIZE).await?;

        let rates: Vec<ExchangeRate> = records
            .iter()
            .filter_map(|record| match record.to_exchange_rate() {
                Ok(rate) => Some(rate),
                Err(e) => {
                    tracing::warn!(currency, error = %e, "Skipping malformed exchange rate record");
                    None
                }
            })
            .collect();

        if rates.is_empty() && records.is_empty() && !self.currency_exists(currency).await? {
            return Err(RateSourceError::UnknownCurrency(currency.to_string()));
        }

        Ok(rates)
    }
}
