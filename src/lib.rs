// Export public modules
pub mod common;
pub mod storage;
pub mod index;
pub mod catalog;
pub mod transaction;
pub mod query;

// Re-export key items for convenient access
pub use storage::buffer::{BufferPoolError, BufferPoolManager};
pub use storage::disk::DiskManager;
pub use storage::page::{PageGuard, ReadPageGuard, WritePageGuard};
pub use storage::table::{TableHeap, Tuple, TupleMeta};
pub use index::btree::BPlusTree;
pub use catalog::Catalog;
pub use transaction::{IsolationLevel, LockManager, LockMode, Transaction, TransactionManager};
