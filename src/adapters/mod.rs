pub mod memory;
pub mod postgres_history_repository;
pub mod postgres_transaction_repository;

pub use memory::{InMemoryHistoryStore, InMemoryTransactionStore};
pub use postgres_history_repository::PostgresHistoryRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
