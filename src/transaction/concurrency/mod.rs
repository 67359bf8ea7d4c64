pub mod transaction;
pub mod lock_manager;
pub mod deadlock;
pub mod transaction_manager;

#[cfg(test)]
mod tests;

pub use transaction::{
    AbortReason, IsolationLevel, LockMode, Transaction, TransactionAbortError, TransactionState,
};
pub use lock_manager::LockManager;
pub use transaction_manager::TransactionManager;
pub use deadlock::WaitsForGraph;
