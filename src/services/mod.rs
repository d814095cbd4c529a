pub mod currency;
pub mod transaction_service;

pub use currency::CurrencyService;
pub use transaction_service::{CreateOutcome, PublishRetryPolicy, TransactionService};
