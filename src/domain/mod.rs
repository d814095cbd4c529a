//! Domain layer: transactions, statuses, exchange rates and conversions.

pub mod currency;
pub mod transaction;

pub use currency::{ConversionError, CurrencyConversion, ExchangeRate};
pub use transaction::{Transaction, TransactionStatus};
