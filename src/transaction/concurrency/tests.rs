use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::common::types::Rid;
use super::lock_manager::LockManager;
use super::transaction::{AbortReason, IsolationLevel, LockMode, TransactionState};
use super::transaction_manager::TransactionManager;

fn setup() -> (Arc<LockManager>, TransactionManager) {
    let _ = env_logger::builder().is_test(true).try_init();
    let lm = Arc::new(LockManager::new(Duration::from_millis(20)));
    let tm = TransactionManager::new(lm.clone());
    (lm, tm)
}

#[test]
fn test_compatibility_matrix() {
    use LockMode::*;
    let compatible = LockManager::are_locks_compatible;
    assert!(compatible(IntentionShared, IntentionShared));
    assert!(compatible(IntentionShared, Shared));
    assert!(compatible(IntentionShared, SharedIntentionExclusive));
    assert!(!compatible(IntentionShared, Exclusive));
    assert!(compatible(IntentionExclusive, IntentionExclusive));
    assert!(!compatible(IntentionExclusive, Shared));
    assert!(compatible(Shared, Shared));
    assert!(!compatible(Shared, SharedIntentionExclusive));
    assert!(!compatible(SharedIntentionExclusive, SharedIntentionExclusive));
    assert!(!compatible(Exclusive, IntentionShared));
}

#[test]
fn test_upgrade_partial_order() {
    use LockMode::*;
    let can = LockManager::can_lock_upgrade;
    assert!(can(IntentionShared, Shared));
    assert!(can(IntentionShared, Exclusive));
    assert!(can(IntentionShared, IntentionExclusive));
    assert!(can(IntentionShared, SharedIntentionExclusive));
    assert!(can(Shared, Exclusive));
    assert!(can(Shared, SharedIntentionExclusive));
    assert!(can(IntentionExclusive, Exclusive));
    assert!(can(SharedIntentionExclusive, Exclusive));
    assert!(!can(Shared, IntentionExclusive));
    assert!(!can(Exclusive, Shared));
    assert!(!can(SharedIntentionExclusive, Shared));
}

#[test]
fn test_lock_unlock_and_idempotence() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&txn, LockMode::Shared, 1).unwrap());
    // Re-acquiring the held mode succeeds without a second request.
    assert!(lm.lock_table(&txn, LockMode::Shared, 1).unwrap());
    assert!(txn.holds_table_lock(1, &[LockMode::Shared]));

    assert!(lm.unlock_table(&txn, 1).unwrap());
    assert!(!txn.holds_table_lock(1, &[LockMode::Shared]));
}

#[test]
fn test_repeatable_read_two_phase_discipline() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Shared, 1).unwrap();
    lm.unlock_table(&txn, 1).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = lm.lock_table(&txn, LockMode::Shared, 2).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_shrinks_only_on_exclusive_release() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);

    lm.lock_table(&txn, LockMode::Shared, 1).unwrap();
    lm.unlock_table(&txn, 1).unwrap();
    assert_eq!(txn.state(), TransactionState::Growing);

    lm.lock_table(&txn, LockMode::Exclusive, 2).unwrap();
    lm.unlock_table(&txn, 2).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);

    // Shared acquisitions stay legal while shrinking under READ_COMMITTED.
    assert!(lm.lock_table(&txn, LockMode::Shared, 3).unwrap());
    let err = lm.lock_table(&txn, LockMode::Exclusive, 4).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
}

#[test]
fn test_read_uncommitted_rejects_shared() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadUncommitted);
    let err = lm.lock_table(&txn, LockMode::Shared, 1).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockSharedOnReadUncommitted);
    assert_eq!(txn.state(), TransactionState::Aborted);

    // An aborted transaction is refused, not re-aborted.
    let txn2 = tm.begin(IsolationLevel::ReadUncommitted);
    txn2.set_state(TransactionState::Aborted);
    assert!(!lm.lock_table(&txn2, LockMode::Exclusive, 1).unwrap());
}

#[test]
fn test_exclusive_waits_for_shared_release() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::Shared, 1).unwrap());

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let lm = lm.clone();
        let t2 = t2.clone();
        let acquired = acquired.clone();
        std::thread::spawn(move || {
            assert!(lm.lock_table(&t2, LockMode::Exclusive, 1).unwrap());
            acquired.store(true, Ordering::SeqCst);
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst), "X granted alongside S");

    lm.unlock_table(&t1, 1).unwrap();
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert!(t2.holds_table_lock(1, &[LockMode::Exclusive]));
}

#[test]
fn test_compatible_waiter_skips_past_blocked_one() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let t3 = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::Shared, 1).unwrap());

    // t2 queues behind the shared holder for X.
    let blocked = {
        let lm = lm.clone();
        let t2 = t2.clone();
        std::thread::spawn(move || lm.lock_table(&t2, LockMode::Exclusive, 1))
    };
    std::thread::sleep(Duration::from_millis(50));

    // t3's S is compatible with the granted set and does not wait behind
    // t2's queued X.
    assert!(lm.lock_table(&t3, LockMode::Shared, 1).unwrap());

    lm.unlock_table(&t1, 1).unwrap();
    lm.unlock_table(&t3, 1).unwrap();
    assert!(blocked.join().unwrap().unwrap());
}

#[test]
fn test_upgrade_shared_to_exclusive() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Shared, 1).unwrap();
    assert!(lm.lock_table(&txn, LockMode::Exclusive, 1).unwrap());
    assert!(txn.holds_table_lock(1, &[LockMode::Exclusive]));
    assert!(!txn.holds_table_lock(1, &[LockMode::Shared]));
}

#[test]
fn test_illegal_upgrade_aborts() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    lm.lock_table(&txn, LockMode::Exclusive, 1).unwrap();
    let err = lm.lock_table(&txn, LockMode::Shared, 1).unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_row_lock_requires_table_lock() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 1);

    let err = lm.lock_row(&txn, LockMode::Shared, 1, rid).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);

    let txn2 = tm.begin(IsolationLevel::RepeatableRead);
    lm.lock_table(&txn2, LockMode::IntentionShared, 1).unwrap();
    assert!(lm.lock_row(&txn2, LockMode::Shared, 1, rid).unwrap());

    // An IS table lock does not cover exclusive row access.
    let err = lm.lock_row(&txn2, LockMode::Exclusive, 1, rid).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);
}

#[test]
fn test_intention_lock_on_row_rejected() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    lm.lock_table(&txn, LockMode::IntentionExclusive, 1).unwrap();

    let err = lm
        .lock_row(&txn, LockMode::IntentionExclusive, 1, Rid::new(1, 1))
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::AttemptedIntentionLockOnRow);
}

#[test]
fn test_table_unlock_blocked_by_row_locks() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(2, 0);

    lm.lock_table(&txn, LockMode::IntentionExclusive, 1).unwrap();
    lm.lock_row(&txn, LockMode::Exclusive, 1, rid).unwrap();

    let err = lm.unlock_table(&txn, 1).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableUnlockedBeforeUnlockingRows);
}

#[test]
fn test_unlock_without_hold_aborts() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let err = lm.unlock_table(&txn, 9).unwrap_err();
    assert_eq!(err.reason, AbortReason::AttemptedUnlockButNoLockHeld);
}

#[test]
fn test_deadlock_detector_aborts_youngest() {
    let (lm, tm) = setup();
    lm.start_deadlock_detection();

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let r1 = Rid::new(1, 1);
    let r2 = Rid::new(1, 2);

    lm.lock_table(&t1, LockMode::IntentionExclusive, 1).unwrap();
    lm.lock_table(&t2, LockMode::IntentionExclusive, 1).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, 1, r1).unwrap();
    lm.lock_row(&t2, LockMode::Exclusive, 1, r2).unwrap();

    // t1 wants r2 (held by t2); t2 wants r1 (held by t1): a cycle the
    // detector must break by aborting the higher id.
    let h1 = {
        let (lm, t1) = (lm.clone(), t1.clone());
        std::thread::spawn(move || lm.lock_row(&t1, LockMode::Exclusive, 1, r2))
    };
    let h2 = {
        let (lm, t2) = (lm.clone(), t2.clone());
        std::thread::spawn(move || lm.lock_row(&t2, LockMode::Exclusive, 1, r1))
    };

    let got_r2 = h1.join().unwrap().unwrap();
    let got_r1 = h2.join().unwrap().unwrap();

    assert!(got_r2, "survivor should obtain the contested row");
    assert!(!got_r1, "victim should come back refused");
    assert_eq!(t2.state(), TransactionState::Aborted);
    assert_eq!(t1.state(), TransactionState::Growing);

    lm.stop_deadlock_detection();
}

#[test]
fn test_commit_releases_everything() {
    let (lm, tm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(3, 3);

    lm.lock_table(&t1, LockMode::IntentionExclusive, 1).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, 1, rid).unwrap();

    let waiter = {
        let (lm, t2) = (lm.clone(), t2.clone());
        std::thread::spawn(move || {
            lm.lock_table(&t2, LockMode::IntentionShared, 1).unwrap();
            lm.lock_row(&t2, LockMode::Shared, 1, rid)
        })
    };
    std::thread::sleep(Duration::from_millis(50));

    tm.commit(&t1);
    assert!(waiter.join().unwrap().unwrap());
    assert_eq!(t1.state(), TransactionState::Committed);
    assert!(!t1.holds_row_locks_on(1));
}
