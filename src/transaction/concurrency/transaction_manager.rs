use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use log::info;

use crate::common::types::TxnId;
use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState};

/// Hands out transactions and finishes them. Commit and abort both funnel
/// through the lock manager so every queue the transaction touched gets its
/// grants re-propagated.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
        }
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let id: TxnId = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(Transaction::new(id, isolation_level))
    }

    pub fn commit(&self, txn: &Arc<Transaction>) {
        txn.set_state(TransactionState::Committed);
        self.lock_manager.release_all(txn);
        info!("txn {} committed", txn.id());
    }

    pub fn abort(&self, txn: &Arc<Transaction>) {
        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(txn);
        info!("txn {} aborted", txn.id());
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }
}
