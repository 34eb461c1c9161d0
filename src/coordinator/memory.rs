//! In-process coordinator.
//!
//! Tracks global transactions and global locks in memory. Used by the test
//! suite and the `globaltx` binary; it supports fault injection so every
//! orchestration failure path can be exercised without a real coordinator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use ulid::Ulid;

use crate::coordinator::client::{CoordinatorClient, LockAttempt};
use crate::coordinator::error::{CoordinatorError, CoordinatorResult};
use crate::transaction::{GlobalStatus, Xid};

/// A global transaction known to the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalRecord {
    pub xid: Xid,
    pub name: String,
    pub timeout: Duration,
    pub status: GlobalStatus,
    pub begun_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_begin: Option<CoordinatorError>,
    fail_commit: Option<CoordinatorError>,
    fail_rollback: Option<CoordinatorError>,
    /// Remaining scripted conflicts per resource key.
    conflicts: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct Counters {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    lock_attempts: AtomicU64,
}

#[derive(Debug, Default)]
struct InMemoryCoordinatorInner {
    transactions: RwLock<HashMap<Xid, GlobalRecord>>,
    /// Resource key to owning transaction.
    locks: Mutex<HashMap<String, Xid>>,
    faults: Mutex<Faults>,
    counters: Counters,
}

/// Coordinator that keeps all state in memory.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinator {
    inner: Arc<InMemoryCoordinatorInner>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Fault Injection ====================

    /// Make every subsequent `begin` fail with `error` (or succeed on `None`).
    pub fn fail_begin(&self, error: Option<CoordinatorError>) {
        self.inner.faults.lock().fail_begin = error;
    }

    /// Make every subsequent `commit` fail with `error` (or succeed on `None`).
    pub fn fail_commit(&self, error: Option<CoordinatorError>) {
        self.inner.faults.lock().fail_commit = error;
    }

    /// Make every subsequent `rollback` fail with `error` (or succeed on `None`).
    pub fn fail_rollback(&self, error: Option<CoordinatorError>) {
        self.inner.faults.lock().fail_rollback = error;
    }

    /// Report a conflict for the next `attempts` acquisitions of `resource_key`.
    pub fn script_conflicts(&self, resource_key: impl Into<String>, attempts: u32) {
        self.inner
            .faults
            .lock()
            .conflicts
            .insert(resource_key.into(), attempts);
    }

    /// Hold `resource_key` on behalf of `owner` until `owner` completes.
    pub fn hold_lock(&self, resource_key: impl Into<String>, owner: Xid) {
        self.inner.locks.lock().insert(resource_key.into(), owner);
    }

    // ==================== Inspection ====================

    /// Status of a transaction, if the coordinator knows it.
    pub fn status(&self, xid: &Xid) -> Option<GlobalStatus> {
        self.inner.transactions.read().get(xid).map(|r| r.status)
    }

    /// Get the record for a transaction.
    pub fn record(&self, xid: &Xid) -> Option<GlobalRecord> {
        self.inner.transactions.read().get(xid).cloned()
    }

    /// Number of transactions still active.
    pub fn active_count(&self) -> usize {
        self.inner
            .transactions
            .read()
            .values()
            .filter(|r| r.status == GlobalStatus::Active)
            .count()
    }

    /// Owner of the global lock on `resource_key`.
    pub fn lock_owner(&self, resource_key: &str) -> Option<Xid> {
        self.inner.locks.lock().get(resource_key).cloned()
    }

    pub fn begin_count(&self) -> u64 {
        self.inner.counters.begins.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u64 {
        self.inner.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn lock_attempt_count(&self) -> u64 {
        self.inner.counters.lock_attempts.load(Ordering::SeqCst)
    }

    // ==================== Internals ====================

    /// Move an active transaction to `status` and release its locks.
    fn complete(&self, xid: &Xid, status: GlobalStatus) -> CoordinatorResult<GlobalStatus> {
        {
            let mut transactions = self.inner.transactions.write();
            let record = transactions
                .get_mut(xid)
                .ok_or_else(|| CoordinatorError::UnknownTransaction(xid.clone()))?;

            if record.status != GlobalStatus::Active {
                return Err(CoordinatorError::Rejected(format!(
                    "transaction {} is {}",
                    xid, record.status
                )));
            }
            record.status = status;
        }

        self.inner.locks.lock().retain(|_, owner| *owner != *xid);
        Ok(status)
    }
}

impl CoordinatorClient for InMemoryCoordinator {
    fn begin(&self, name: &str, timeout: Duration) -> CoordinatorResult<Xid> {
        self.inner.counters.begins.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.inner.faults.lock().fail_begin.clone() {
            return Err(err);
        }

        let xid = Xid::new(format!("mem:{}", Ulid::new().to_string().to_lowercase()))?;
        let record = GlobalRecord {
            xid: xid.clone(),
            name: name.to_string(),
            timeout,
            status: GlobalStatus::Active,
            begun_at: Utc::now(),
        };
        self.inner.transactions.write().insert(xid.clone(), record);

        Ok(xid)
    }

    fn commit(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus> {
        self.inner.counters.commits.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.inner.faults.lock().fail_commit.clone() {
            return Err(err);
        }

        self.complete(xid, GlobalStatus::Committed)
    }

    fn rollback(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus> {
        self.inner.counters.rollbacks.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.inner.faults.lock().fail_rollback.clone() {
            return Err(err);
        }

        self.complete(xid, GlobalStatus::RolledBack)
    }

    fn try_acquire_lock(&self, xid: &Xid, resource_key: &str) -> CoordinatorResult<LockAttempt> {
        self.inner.counters.lock_attempts.fetch_add(1, Ordering::SeqCst);

        match self.status(xid) {
            Some(GlobalStatus::Active) => {}
            Some(status) => {
                return Err(CoordinatorError::Rejected(format!(
                    "transaction {} is {}",
                    xid, status
                )))
            }
            None => return Err(CoordinatorError::UnknownTransaction(xid.clone())),
        }

        {
            let mut faults = self.inner.faults.lock();
            if let Some(remaining) = faults.conflicts.get_mut(resource_key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(LockAttempt::Conflict);
                }
            }
        }

        let mut locks = self.inner.locks.lock();
        match locks.get(resource_key) {
            Some(owner) if owner != xid => Ok(LockAttempt::Conflict),
            Some(_) => Ok(LockAttempt::Acquired),
            None => {
                locks.insert(resource_key.to_string(), xid.clone());
                Ok(LockAttempt::Acquired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin(coordinator: &InMemoryCoordinator) -> Xid {
        coordinator.begin("test", Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_begin_and_commit() {
        let coordinator = InMemoryCoordinator::new();
        let xid = begin(&coordinator);
        assert_eq!(coordinator.status(&xid), Some(GlobalStatus::Active));
        assert_eq!(coordinator.active_count(), 1);

        assert_eq!(coordinator.commit(&xid).unwrap(), GlobalStatus::Committed);
        assert_eq!(coordinator.active_count(), 0);
        assert_eq!(coordinator.record(&xid).unwrap().name, "test");
    }

    #[test]
    fn test_complete_twice_rejected() {
        let coordinator = InMemoryCoordinator::new();
        let xid = begin(&coordinator);
        coordinator.rollback(&xid).unwrap();

        let err = coordinator.commit(&xid).unwrap_err();
        assert!(matches!(err, CoordinatorError::Rejected(_)));
    }

    #[test]
    fn test_unknown_transaction() {
        let coordinator = InMemoryCoordinator::new();
        let xid = Xid::new("nope").unwrap();
        assert_eq!(
            coordinator.commit(&xid),
            Err(CoordinatorError::UnknownTransaction(xid.clone()))
        );
        assert!(coordinator.try_acquire_lock(&xid, "k").is_err());
    }

    #[test]
    fn test_lock_ownership_released_on_completion() {
        let coordinator = InMemoryCoordinator::new();
        let tx1 = begin(&coordinator);
        let tx2 = begin(&coordinator);

        assert_eq!(coordinator.try_acquire_lock(&tx1, "users:1").unwrap(), LockAttempt::Acquired);
        assert_eq!(coordinator.try_acquire_lock(&tx1, "users:1").unwrap(), LockAttempt::Acquired);
        assert_eq!(coordinator.try_acquire_lock(&tx2, "users:1").unwrap(), LockAttempt::Conflict);

        coordinator.commit(&tx1).unwrap();
        assert_eq!(coordinator.lock_owner("users:1"), None);
        assert_eq!(coordinator.try_acquire_lock(&tx2, "users:1").unwrap(), LockAttempt::Acquired);
    }

    #[test]
    fn test_scripted_conflicts() {
        let coordinator = InMemoryCoordinator::new();
        let xid = begin(&coordinator);
        coordinator.script_conflicts("k", 2);

        assert_eq!(coordinator.try_acquire_lock(&xid, "k").unwrap(), LockAttempt::Conflict);
        assert_eq!(coordinator.try_acquire_lock(&xid, "k").unwrap(), LockAttempt::Conflict);
        assert_eq!(coordinator.try_acquire_lock(&xid, "k").unwrap(), LockAttempt::Acquired);
        assert_eq!(coordinator.lock_attempt_count(), 3);
    }

    #[test]
    fn test_injected_faults() {
        let coordinator = InMemoryCoordinator::new();
        coordinator.fail_begin(Some(CoordinatorError::Unavailable("down".into())));
        assert!(coordinator.begin("x", Duration::from_secs(1)).is_err());
        assert_eq!(coordinator.begin_count(), 1);

        coordinator.fail_begin(None);
        let xid = begin(&coordinator);
        coordinator.fail_commit(Some(CoordinatorError::Timeout));
        assert_eq!(coordinator.commit(&xid), Err(CoordinatorError::Timeout));
        assert_eq!(coordinator.status(&xid), Some(GlobalStatus::Active));
    }
}
