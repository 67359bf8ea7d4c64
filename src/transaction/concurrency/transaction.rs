use std::collections::{HashMap, HashSet};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TableOid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Multi-granularity lock modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

/// Why the lock manager aborted a transaction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested while shrinking")]
    LockOnShrinking,
    #[error("illegal lock upgrade")]
    UpgradeConflict,
    #[error("shared lock requested under READ_UNCOMMITTED")]
    LockSharedOnReadUncommitted,
    #[error("row lock requested without a covering table lock")]
    TableLockNotPresent,
    #[error("intention lock requested on a row")]
    AttemptedIntentionLockOnRow,
    #[error("table unlocked before its row locks")]
    TableUnlockedBeforeUnlockingRows,
    #[error("unlock of a lock that is not held")]
    AttemptedUnlockButNoLockHeld,
}

#[derive(Error, Debug)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbortError {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

#[derive(Default)]
struct LockSets {
    shared_tables: HashSet<TableOid>,
    exclusive_tables: HashSet<TableOid>,
    intention_shared_tables: HashSet<TableOid>,
    intention_exclusive_tables: HashSet<TableOid>,
    shared_intention_exclusive_tables: HashSet<TableOid>,
    shared_rows: HashMap<TableOid, HashSet<Rid>>,
    exclusive_rows: HashMap<TableOid, HashSet<Rid>>,
}

impl LockSets {
    fn table_set(&mut self, mode: LockMode) -> &mut HashSet<TableOid> {
        match mode {
            LockMode::Shared => &mut self.shared_tables,
            LockMode::Exclusive => &mut self.exclusive_tables,
            LockMode::IntentionShared => &mut self.intention_shared_tables,
            LockMode::IntentionExclusive => &mut self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut self.shared_intention_exclusive_tables,
        }
    }
}

/// An active transaction: identity, isolation level, 2PL state and the
/// bookkeeping of every table/row lock it holds. The lock manager is the
/// only writer of the lock sets.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    locks: Mutex<LockSets>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            locks: Mutex::new(LockSets::default()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn add_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.locks.lock().table_set(mode).insert(oid);
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.locks.lock().table_set(mode).remove(&oid);
    }

    pub(crate) fn add_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        let mut locks = self.locks.lock();
        let rows = match mode {
            LockMode::Shared => &mut locks.shared_rows,
            LockMode::Exclusive => &mut locks.exclusive_rows,
            _ => return,
        };
        rows.entry(oid).or_default().insert(rid);
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        let mut locks = self.locks.lock();
        let rows = match mode {
            LockMode::Shared => &mut locks.shared_rows,
            LockMode::Exclusive => &mut locks.exclusive_rows,
            _ => return,
        };
        if let Some(set) = rows.get_mut(&oid) {
            set.remove(&rid);
        }
    }

    /// Does this transaction hold any of the given modes on the table?
    pub fn holds_table_lock(&self, oid: TableOid, modes: &[LockMode]) -> bool {
        let mut locks = self.locks.lock();
        modes.iter().any(|&mode| locks.table_set(mode).contains(&oid))
    }

    /// Any row lock still held under the given table?
    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        let locks = self.locks.lock();
        locks.shared_rows.get(&oid).is_some_and(|s| !s.is_empty())
            || locks.exclusive_rows.get(&oid).is_some_and(|s| !s.is_empty())
    }

    /// Drop all lock bookkeeping; used when the transaction finishes
    pub(crate) fn clear_lock_sets(&self) {
        *self.locks.lock() = LockSets::default();
    }
}
