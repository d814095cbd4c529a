//! Collaborator interfaces the core depends on.

mod rate_source;
mod repository;

pub use rate_source::{RateSource, RateSourceError};
pub use repository::{RepositoryError, RepositoryResult, TransactionRepository};
