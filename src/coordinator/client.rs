//! The coordinator client contract.

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::error::CoordinatorResult;
use crate::transaction::{GlobalStatus, Xid};

/// Result of a single global lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    /// Another global transaction holds the lock.
    Conflict,
}

/// Client for the external transaction coordinator.
///
/// Implementations own their transport and concurrency control. The
/// orchestrator issues at most one request at a time per branch and never
/// retries a request on its own, except lock acquisition.
pub trait CoordinatorClient: Send + Sync {
    /// Begin a global transaction and return its xid.
    fn begin(&self, name: &str, timeout: Duration) -> CoordinatorResult<Xid>;

    /// Commit a global transaction, returning the coordinator's final status.
    fn commit(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus>;

    /// Roll back a global transaction, returning the coordinator's final status.
    fn rollback(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus>;

    /// Try once to take the global lock on `resource_key` for `xid`.
    fn try_acquire_lock(&self, xid: &Xid, resource_key: &str) -> CoordinatorResult<LockAttempt>;
}

impl<C: CoordinatorClient + ?Sized> CoordinatorClient for Arc<C> {
    fn begin(&self, name: &str, timeout: Duration) -> CoordinatorResult<Xid> {
        (**self).begin(name, timeout)
    }

    fn commit(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus> {
        (**self).commit(xid)
    }

    fn rollback(&self, xid: &Xid) -> CoordinatorResult<GlobalStatus> {
        (**self).rollback(xid)
    }

    fn try_acquire_lock(&self, xid: &Xid, resource_key: &str) -> CoordinatorResult<LockAttempt> {
        (**self).try_acquire_lock(xid, resource_key)
    }
}
