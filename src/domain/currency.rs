//! Exchange rates and the derived currency conversion of a transaction.

use bigdecimal::{BigDecimal, Zero};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::transaction::Transaction;

/// Length of the look-back window, in calendar months.
pub const RATE_WINDOW_MONTHS: u32 = 6;
pub const CONVERSION_SCALE: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("invalid currency code")]
    InvalidCurrency,
    #[error("no valid exchange rate found within 6 months of transaction date")]
    NoValidExchangeRate,
}

/// A rate as observed from the rate source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    pub rate: BigDecimal,
    pub effective_date: NaiveDate,
}

/// Inclusive `[transaction_date - 6 months, transaction_date]` window.
///
/// The start keeps the day of month. When the target month is too short the
/// surplus days roll into the following month, so 2024-08-31 yields
/// 2024-03-02 rather than 2024-02-29.
pub fn rate_window(transaction_date: NaiveDate) -> Result<(NaiveDate, NaiveDate), ConversionError> {
    let surplus_days = u64::from(transaction_date.day0());
    let start = transaction_date
        .with_day(1)
        .and_then(|first| first.checked_sub_months(Months::new(RATE_WINDOW_MONTHS)))
        .and_then(|first| first.checked_add_days(Days::new(surplus_days)))
        .ok_or(ConversionError::NoValidExchangeRate)?;
    Ok((start, transaction_date))
}

/// Picks the most recent rate dated on or before `transaction_date`.
///
/// Among rates sharing the winning effective date the first one in `rates`
/// order is kept.
pub fn select_rate(rates: &[ExchangeRate], transaction_date: NaiveDate) -> Option<&ExchangeRate> {
    rates
        .iter()
        .filter(|r| r.effective_date <= transaction_date)
        .fold(None, |best: Option<&ExchangeRate>, candidate| match best {
            Some(b) if candidate.effective_date <= b.effective_date => Some(b),
            _ => Some(candidate),
        })
}

fn validate_exchange_date(
    transaction_date: NaiveDate,
    exchange_date: NaiveDate,
) -> Result<(), ConversionError> {
    let (start, end) = rate_window(transaction_date)?;
    if exchange_date > end || exchange_date < start {
        return Err(ConversionError::NoValidExchangeRate);
    }
    Ok(())
}

/// Result of re-expressing a transaction's USD amount in another currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyConversion {
    pub transaction_id: Uuid,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub original_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub exchange_date: NaiveDate,
    pub target_currency: String,
    pub converted_amount: BigDecimal,
}

impl CurrencyConversion {
    /// The product uses the full-precision rate and is rounded afterwards;
    /// the stored rate is rounded separately for display.
    pub fn new(
        tx: &Transaction,
        target_currency: &str,
        rate: &ExchangeRate,
    ) -> Result<Self, ConversionError> {
        validate_exchange_date(tx.transaction_date, rate.effective_date)?;

        let converted_amount = (&tx.amount_usd * &rate.rate)
            .round(CONVERSION_SCALE)
            .with_scale(CONVERSION_SCALE);

        Ok(Self {
            transaction_id: tx.id,
            description: tx.description.clone(),
            transaction_date: tx.transaction_date,
            original_amount: tx.amount_usd.clone(),
            exchange_rate: rate.rate.round(CONVERSION_SCALE).with_scale(CONVERSION_SCALE),
            exchange_date: rate.effective_date,
            target_currency: target_currency.to_string(),
            converted_amount,
        })
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.target_currency.trim().is_empty() {
            return Err(ConversionError::InvalidCurrency);
        }
        if self.exchange_rate <= BigDecimal::zero() {
            return Err(ConversionError::NoValidExchangeRate);
        }
        validate_exchange_date(self.transaction_date, self.exchange_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionStatus;
    use chrono::Utc;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn rate(value: &str, effective: NaiveDate) -> ExchangeRate {
        ExchangeRate {
            currency: "Euro Zone-Euro".to_string(),
            rate: dec(value),
            effective_date: effective,
        }
    }

    fn transaction(amount: &str, on: NaiveDate) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            description: "Hotel".to_string(),
            transaction_date: on,
            amount_usd: dec(amount),
            created_at: Utc::now(),
            processed_at: None,
            status: TransactionStatus::Pending,
        }
    }

    #[test]
    fn test_window_uses_calendar_months() {
        assert_eq!(
            rate_window(date(2024, 7, 15)).unwrap(),
            (date(2024, 1, 15), date(2024, 7, 15))
        );
        assert_eq!(rate_window(date(2024, 8, 31)).unwrap().0, date(2024, 3, 2));
        assert_eq!(rate_window(date(2023, 8, 30)).unwrap().0, date(2023, 3, 2));
        assert_eq!(rate_window(date(2024, 8, 29)).unwrap().0, date(2024, 2, 29));
    }

    #[test]
    fn test_month_end_window_rejects_rolled_over_days() {
        let tx = transaction("1.00", date(2024, 8, 31));

        assert_eq!(
            CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 3, 1))).unwrap_err(),
            ConversionError::NoValidExchangeRate
        );
        assert_eq!(
            CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 2, 29))).unwrap_err(),
            ConversionError::NoValidExchangeRate
        );
        assert!(CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 3, 2))).is_ok());
    }

    #[test]
    fn test_select_most_recent_not_after_transaction() {
        let on = date(2024, 1, 10);
        let rates = vec![
            rate("0.90", date(2024, 1, 11)),
            rate("0.85", date(2024, 1, 9)),
            rate("0.80", date(2023, 12, 31)),
        ];
        assert_eq!(select_rate(&rates, on).unwrap().rate, dec("0.85"));
    }

    #[test]
    fn test_select_rejects_only_future_rates() {
        let on = date(2024, 1, 10);
        let rates = vec![rate("0.90", date(2024, 1, 11))];
        assert!(select_rate(&rates, on).is_none());
    }

    #[test]
    fn test_select_tie_keeps_first_returned() {
        let on = date(2024, 1, 10);
        let rates = vec![
            rate("0.81", date(2024, 1, 5)),
            rate("0.82", date(2024, 1, 5)),
        ];
        assert_eq!(select_rate(&rates, on).unwrap().rate, dec("0.81"));
    }

    #[test]
    fn test_conversion_rounds_product_of_full_precision_rate() {
        let tx = transaction("10.00", date(2024, 1, 10));
        let conversion =
            CurrencyConversion::new(&tx, "Euro Zone-Euro", &rate("0.123456", date(2024, 1, 9)))
                .unwrap();

        // 10.00 * 0.123456 = 1.23456 -> 1.2346; rounding the rate first would give 1.2350
        assert_eq!(conversion.converted_amount.to_string(), "1.2346");
        assert_eq!(conversion.exchange_rate.to_string(), "0.1235");
    }

    #[test]
    fn test_conversion_scenario_eur() {
        let tx = transaction("100.00", date(2024, 1, 10));
        let conversion =
            CurrencyConversion::new(&tx, "EUR", &rate("0.8500", date(2024, 1, 9))).unwrap();

        assert_eq!(conversion.converted_amount, dec("85.0000"));
        assert_eq!(conversion.converted_amount.to_string(), "85.0000");
        assert_eq!(conversion.exchange_date, date(2024, 1, 9));
        assert!(conversion.validate().is_ok());
    }

    #[test]
    fn test_window_boundaries() {
        let on = date(2024, 7, 10);
        let tx = transaction("1.00", on);

        assert!(CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 1, 10))).is_ok());
        assert_eq!(
            CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 1, 9))).unwrap_err(),
            ConversionError::NoValidExchangeRate
        );
        assert_eq!(
            CurrencyConversion::new(&tx, "EUR", &rate("1", date(2024, 7, 11))).unwrap_err(),
            ConversionError::NoValidExchangeRate
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_rate_and_blank_currency() {
        let tx = transaction("1.00", date(2024, 1, 10));
        let zero = CurrencyConversion::new(&tx, "EUR", &rate("0", date(2024, 1, 9))).unwrap();
        assert_eq!(
            zero.validate().unwrap_err(),
            ConversionError::NoValidExchangeRate
        );

        let blank = CurrencyConversion::new(&tx, " ", &rate("1", date(2024, 1, 9))).unwrap();
        assert_eq!(blank.validate().unwrap_err(), ConversionError::InvalidCurrency);
    }
}
