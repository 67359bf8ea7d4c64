pub mod concurrency;

pub use concurrency::{
    AbortReason, IsolationLevel, LockManager, LockMode, Transaction, TransactionAbortError,
    TransactionManager, TransactionState,
};
