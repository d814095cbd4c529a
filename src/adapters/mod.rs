//! Store adapters behind the `TransactionRepository` port.

mod memory_transaction_repository;
mod postgres_transaction_repository;

pub use memory_transaction_repository::InMemoryTransactionRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
