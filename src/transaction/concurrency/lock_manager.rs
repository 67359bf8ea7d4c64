use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use log::{debug, error, info};

use crate::common::types::{Rid, TableOid, TxnId, INVALID_TXN_ID};
use super::transaction::{
    AbortReason, IsolationLevel, LockMode, Transaction, TransactionAbortError, TransactionState,
};
use super::deadlock::WaitsForGraph;

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// What a queue protects; carried through the shared acquire path so an
/// in-place upgrade can unbook the old mode from the right lock set.
#[derive(Clone, Copy)]
enum LockObject {
    Table(TableOid),
    Row(TableOid, Rid),
}

struct QueueState {
    requests: Vec<LockRequest>,
    /// Transaction currently upgrading its lock, if any. At most one per queue.
    upgrading: TxnId,
}

pub(crate) struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                requests: Vec::new(),
                upgrading: INVALID_TXN_ID,
            }),
            cv: Condvar::new(),
        }
    }
}

/// Hierarchical two-phase lock manager over tables and rows.
///
/// Each locked object owns a FIFO request queue with its own mutex and
/// condition variable. Acquisition blocks on the queue until granted;
/// release re-runs grant propagation and broadcasts. A background thread
/// breaks deadlocks by aborting the youngest transaction on a cycle of the
/// waits-for graph.
pub struct LockManager {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    txn_registry: Mutex<HashMap<TxnId, Weak<Transaction>>>,
    cycle_detection_interval: Duration,
    running: AtomicBool,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    pub fn new(cycle_detection_interval: Duration) -> Self {
        Self {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            txn_registry: Mutex::new(HashMap::new()),
            cycle_detection_interval,
            running: AtomicBool::new(false),
            detector: Mutex::new(None),
        }
    }

    /// Symmetric compatibility matrix of the five modes
    pub fn are_locks_compatible(a: LockMode, b: LockMode) -> bool {
        use LockMode::*;
        match a {
            IntentionShared => b != Exclusive,
            IntentionExclusive => matches!(b, IntentionShared | IntentionExclusive),
            Shared => matches!(b, IntentionShared | Shared),
            SharedIntentionExclusive => b == IntentionShared,
            Exclusive => false,
        }
    }

    /// Partial order of legal in-place upgrades
    pub fn can_lock_upgrade(from: LockMode, to: LockMode) -> bool {
        use LockMode::*;
        match from {
            IntentionShared => to != IntentionShared,
            Shared => matches!(to, Exclusive | SharedIntentionExclusive),
            IntentionExclusive => matches!(to, Exclusive | SharedIntentionExclusive),
            SharedIntentionExclusive => to == Exclusive,
            Exclusive => false,
        }
    }

    /// Acquire a table lock, blocking until granted. `Ok(false)` means the
    /// transaction was already (or became) aborted and got nothing.
    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<bool, TransactionAbortError> {
        if !self.check_acquire(txn, mode)? {
            return Ok(false);
        }
        self.register(txn);

        let queue = {
            let mut map = self.table_lock_map.lock();
            map.entry(oid).or_insert_with(|| Arc::new(LockRequestQueue::new())).clone()
        };

        self.acquire_on_queue(txn, mode, &queue, LockObject::Table(oid))?;
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        txn.add_table_lock(mode, oid);
        debug!("txn {} locked table {} in {:?}", txn.id(), oid, mode);
        Ok(true)
    }

    /// Release a table lock. Refuses while row locks under it remain.
    pub fn unlock_table(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
    ) -> Result<bool, TransactionAbortError> {
        if txn.holds_row_locks_on(oid) {
            return Err(self.abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let queue = match self.table_lock_map.lock().get(&oid) {
            Some(queue) => queue.clone(),
            None => return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        let mode = self.release_on_queue(txn, &queue)?;
        txn.remove_table_lock(mode, oid);
        self.update_state_on_unlock(txn, mode);
        debug!("txn {} unlocked table {} ({:?})", txn.id(), oid, mode);
        Ok(true)
    }

    /// Acquire a row lock. Only `Shared` and `Exclusive` are legal, and the
    /// transaction must already hold a covering table lock.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: Rid,
    ) -> Result<bool, TransactionAbortError> {
        if !self.check_acquire(txn, mode)? {
            return Ok(false);
        }
        if !matches!(mode, LockMode::Shared | LockMode::Exclusive) {
            return Err(self.abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }
        if !self.table_lock_covers_row(txn, oid, mode) {
            return Err(self.abort(txn, AbortReason::TableLockNotPresent));
        }
        self.register(txn);

        let queue = {
            let mut map = self.row_lock_map.lock();
            map.entry(rid).or_insert_with(|| Arc::new(LockRequestQueue::new())).clone()
        };

        self.acquire_on_queue(txn, mode, &queue, LockObject::Row(oid, rid))?;
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        txn.add_row_lock(mode, oid, rid);
        debug!("txn {} locked row {} in {:?}", txn.id(), rid, mode);
        Ok(true)
    }

    /// Release a row lock. With `force`, the isolation-driven state
    /// transition is skipped (used when rolling back).
    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
        rid: Rid,
        force: bool,
    ) -> Result<bool, TransactionAbortError> {
        let queue = match self.row_lock_map.lock().get(&rid) {
            Some(queue) => queue.clone(),
            None => return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        let mode = self.release_on_queue(txn, &queue)?;
        txn.remove_row_lock(mode, oid, rid);
        if !force {
            self.update_state_on_unlock(txn, mode);
        }
        debug!("txn {} unlocked row {} ({:?})", txn.id(), rid, mode);
        Ok(true)
    }

    /// Remove every request the transaction still has anywhere, granted or
    /// waiting, propagating grants and waking queues. No 2PL transitions.
    pub fn release_all(&self, txn: &Arc<Transaction>) {
        self.withdraw_requests(txn.id());
        txn.clear_lock_sets();
    }

    /// Fast-rejects and isolation screening for a new acquisition
    fn check_acquire(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
    ) -> Result<bool, TransactionAbortError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(
                    mode,
                    LockMode::Shared | LockMode::IntentionShared | LockMode::SharedIntentionExclusive
                ) {
                    return Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if txn.state() == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if txn.state() == TransactionState::Shrinking
                    && !matches!(mode, LockMode::IntentionShared | LockMode::Shared)
                {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(true)
    }

    fn table_lock_covers_row(&self, txn: &Arc<Transaction>, oid: TableOid, mode: LockMode) -> bool {
        use LockMode::*;
        let exclusive_cover = [IntentionExclusive, SharedIntentionExclusive, Exclusive];
        match mode {
            Exclusive => txn.holds_table_lock(oid, &exclusive_cover),
            _ => {
                txn.holds_table_lock(oid, &exclusive_cover)
                    || txn.holds_table_lock(oid, &[IntentionShared, Shared])
            }
        }
    }

    fn book_del(&self, txn: &Arc<Transaction>, mode: LockMode, object: LockObject) {
        match object {
            LockObject::Table(oid) => txn.remove_table_lock(mode, oid),
            LockObject::Row(oid, rid) => txn.remove_row_lock(mode, oid, rid),
        }
    }

    /// Queue protocol shared by table and row acquisition: upgrade or
    /// enqueue, then grant immediately or wait on the condition variable.
    fn acquire_on_queue(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        queue: &Arc<LockRequestQueue>,
        object: LockObject,
    ) -> Result<(), TransactionAbortError> {
        let txn_id = txn.id();
        let mut state = queue.state.lock();

        let mut need_wait = false;
        let mut upgrading = false;
        let mut upgrade_conflict = false;
        {
            let st = &mut *state;
            for request in st.requests.iter_mut() {
                if request.txn_id == txn_id {
                    if request.mode == mode {
                        // Re-acquiring a held mode is idempotent.
                        return Ok(());
                    }
                    if st.upgrading == INVALID_TXN_ID
                        && Self::can_lock_upgrade(request.mode, mode)
                    {
                        self.book_del(txn, request.mode, object);
                        st.upgrading = txn_id;
                        request.mode = mode;
                        request.granted = false;
                        upgrading = true;
                    } else {
                        upgrade_conflict = true;
                        break;
                    }
                }
                if !need_wait && request.granted && !Self::are_locks_compatible(request.mode, mode)
                {
                    need_wait = true;
                }
            }
        }
        if upgrade_conflict {
            drop(state);
            return Err(self.abort(txn, AbortReason::UpgradeConflict));
        }
        if !upgrading {
            // Fresh requests go in front of existing waiters, behind the
            // granted holders.
            let pos = state
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(state.requests.len());
            state.requests.insert(pos, LockRequest { txn_id, mode, granted: false });
        }

        if !need_wait {
            if let Some(request) = state.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                request.granted = true;
            }
            if state.upgrading == txn_id {
                state.upgrading = INVALID_TXN_ID;
            }
            return Ok(());
        }

        loop {
            let granted = state
                .requests
                .iter()
                .any(|r| r.txn_id == txn_id && r.granted);
            if granted {
                break;
            }
            if txn.state() == TransactionState::Aborted {
                // Deadlock victim (or externally aborted): withdraw and
                // let the queue move on.
                state.requests.retain(|r| r.txn_id != txn_id);
                if state.upgrading == txn_id {
                    state.upgrading = INVALID_TXN_ID;
                }
                Self::grant_new_locks(&mut state);
                queue.cv.notify_all();
                return Ok(());
            }
            queue.cv.wait(&mut state);
        }

        if state.upgrading == txn_id {
            state.upgrading = INVALID_TXN_ID;
        }
        Ok(())
    }

    /// Remove the caller's granted request from the queue, propagate grants
    /// and wake waiters. Returns the released mode.
    fn release_on_queue(
        &self,
        txn: &Arc<Transaction>,
        queue: &Arc<LockRequestQueue>,
    ) -> Result<LockMode, TransactionAbortError> {
        let txn_id = txn.id();
        let mut state = queue.state.lock();

        let pos = state
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && r.granted);
        let pos = match pos {
            Some(pos) => pos,
            None => {
                drop(state);
                return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
            }
        };
        let mode = state.requests.remove(pos).mode;

        Self::grant_new_locks(&mut state);
        queue.cv.notify_all();
        Ok(mode)
    }

    /// Isolation-dependent 2PL transition on release
    fn update_state_on_unlock(&self, txn: &Arc<Transaction>, mode: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                txn.set_state(TransactionState::Shrinking);
            }
            IsolationLevel::ReadCommitted => {
                if mode == LockMode::Exclusive {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            IsolationLevel::ReadUncommitted => {
                if mode == LockMode::Shared {
                    error!("txn {} released an S lock under READ_UNCOMMITTED", txn.id());
                }
                if mode == LockMode::Exclusive {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
        }
    }

    /// Grant propagation: the pending upgrader goes first and blocks the
    /// queue while incompatible; then every waiter compatible with the
    /// running granted set is granted, skipping past blocked ones.
    fn grant_new_locks(state: &mut QueueState) {
        let mut granted_modes: Vec<LockMode> = state
            .requests
            .iter()
            .filter(|r| r.granted)
            .map(|r| r.mode)
            .collect();

        if state.upgrading != INVALID_TXN_ID {
            let upgrader = state.upgrading;
            if let Some(request) = state
                .requests
                .iter_mut()
                .find(|r| !r.granted && r.txn_id == upgrader)
            {
                if granted_modes
                    .iter()
                    .all(|&m| Self::are_locks_compatible(m, request.mode))
                {
                    request.granted = true;
                    granted_modes.push(request.mode);
                    state.upgrading = INVALID_TXN_ID;
                } else {
                    return;
                }
            }
        }

        for request in state.requests.iter_mut().filter(|r| !r.granted) {
            if granted_modes
                .iter()
                .all(|&m| Self::are_locks_compatible(m, request.mode))
            {
                request.granted = true;
                granted_modes.push(request.mode);
            }
        }
    }

    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> TransactionAbortError {
        txn.set_state(TransactionState::Aborted);
        error!("aborting txn {}: {}", txn.id(), reason);
        TransactionAbortError { txn_id: txn.id(), reason }
    }

    fn register(&self, txn: &Arc<Transaction>) {
        self.txn_registry.lock().insert(txn.id(), Arc::downgrade(txn));
    }

    /// Remove every request of `txn_id` from every queue, propagating
    /// grants and waking waiters on each touched queue.
    fn withdraw_requests(&self, txn_id: TxnId) {
        let queues: Vec<Arc<LockRequestQueue>> = {
            let tables = self.table_lock_map.lock();
            let rows = self.row_lock_map.lock();
            tables.values().cloned().chain(rows.values().cloned()).collect()
        };
        for queue in queues {
            let mut state = queue.state.lock();
            let before = state.requests.len();
            state.requests.retain(|r| r.txn_id != txn_id);
            if state.upgrading == txn_id {
                state.upgrading = INVALID_TXN_ID;
            }
            if state.requests.len() != before {
                Self::grant_new_locks(&mut state);
                queue.cv.notify_all();
            }
        }
    }

    /// Start the background deadlock detector
    pub fn start_deadlock_detection(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(self);
        let interval = self.cycle_detection_interval;
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            let manager = match weak.upgrade() {
                Some(manager) => manager,
                None => break,
            };
            if !manager.running.load(Ordering::SeqCst) {
                break;
            }
            manager.run_cycle_detection();
        });
        *self.detector.lock() = Some(handle);
    }

    pub fn stop_deadlock_detection(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector.lock().take() {
            let _ = handle.join();
        }
    }

    /// One detection pass: rebuild the waits-for graph, abort the youngest
    /// transaction of each cycle found, clean up, and repeat until acyclic.
    pub fn run_cycle_detection(&self) {
        loop {
            let graph = self.build_waits_for_graph();
            let cycle = match graph.find_cycle() {
                Some(cycle) => cycle,
                None => return,
            };
            let victim = cycle.iter().copied().max().unwrap_or(INVALID_TXN_ID);
            info!("deadlock cycle {:?}, aborting txn {}", cycle, victim);

            let txn = self.txn_registry.lock().get(&victim).and_then(Weak::upgrade);
            match txn {
                Some(txn) => {
                    txn.set_state(TransactionState::Aborted);
                    self.release_all(&txn);
                }
                None => {
                    // The transaction object is gone; scrub its requests so
                    // the cycle cannot re-form.
                    self.withdraw_requests(victim);
                }
            }
        }
    }

    /// Edge Ti -> Tj for every waiter Ti blocked by an incompatible granted
    /// holder Tj on the same queue.
    fn build_waits_for_graph(&self) -> WaitsForGraph {
        let mut graph = WaitsForGraph::new();
        let queues: Vec<Arc<LockRequestQueue>> = {
            let tables = self.table_lock_map.lock();
            let rows = self.row_lock_map.lock();
            tables.values().cloned().chain(rows.values().cloned()).collect()
        };
        for queue in queues {
            let state = queue.state.lock();
            for waiter in state.requests.iter().filter(|r| !r.granted) {
                for holder in state.requests.iter().filter(|r| r.granted) {
                    if waiter.txn_id != holder.txn_id
                        && !Self::are_locks_compatible(holder.mode, waiter.mode)
                    {
                        graph.add_edge(waiter.txn_id, holder.txn_id);
                    }
                }
            }
        }
        graph
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector.get_mut().take() {
            let _ = handle.join();
        }
    }
}
