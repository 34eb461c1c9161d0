//! The transaction context threaded through a call chain.
//!
//! A [`TransactionContext`] is an explicit value owned by the caller and
//! passed `&mut` into every transactional call. It is never shared between
//! unrelated call chains, so concurrently running chains cannot observe each
//! other's transactions.
//!
//! Suspension is scoped: [`TransactionContext::suspend`] returns a
//! [`ContextScope`] that restores the suspended transaction when dropped,
//! whether the scope exits normally, with an error, or by unwinding. Because
//! the scope borrows the context mutably, nested scopes are strictly LIFO.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::lock::LockRetryPolicy;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::types::{BranchRole, GlobalStatus, Xid};

/// The global transaction bound to a context.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub(crate) xid: Xid,
    pub(crate) status: GlobalStatus,
    pub(crate) role: BranchRole,
    pub(crate) name: String,
    /// Fixed at begin; never extended.
    pub(crate) deadline: Option<Instant>,
    pub(crate) rollback_only: bool,
    /// What forced rollback-only, when it was more than a rule decision.
    pub(crate) rollback_cause: Option<TransactionError>,
    /// Calls currently running joined to this branch.
    pub(crate) joins: u32,
    pub(crate) started_at: DateTime<Utc>,
}

impl BranchState {
    /// A transaction this process began. `None` means no deadline.
    pub(crate) fn launched(xid: Xid, name: impl Into<String>, deadline: Option<Instant>) -> Self {
        Self {
            xid,
            status: GlobalStatus::Active,
            role: BranchRole::Launcher,
            name: name.into(),
            deadline,
            rollback_only: false,
            rollback_cause: None,
            joins: 0,
            started_at: Utc::now(),
        }
    }

    /// A transaction joined from a carried xid.
    pub(crate) fn joined(xid: Xid) -> Self {
        Self {
            xid,
            status: GlobalStatus::Active,
            role: BranchRole::Participant,
            name: String::new(),
            deadline: None,
            rollback_only: false,
            rollback_cause: None,
            joins: 0,
            started_at: Utc::now(),
        }
    }

    pub fn xid(&self) -> &Xid {
        &self.xid
    }

    pub fn status(&self) -> GlobalStatus {
        self.status
    }

    /// Role of the call currently running on this branch.
    ///
    /// A call joined to a launched branch is a participant even though the
    /// branch itself was begun here.
    pub fn role(&self) -> BranchRole {
        if self.joins > 0 {
            BranchRole::Participant
        } else {
            self.role
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joins > 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn rollback_cause(&self) -> Option<&TransactionError> {
        self.rollback_cause.as_ref()
    }

    /// When this process bound the transaction.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() > d)
    }
}

/// Cooperative cancellation flag shared by a call chain.
///
/// Cloning yields a handle to the same flag, so the caller can keep one and
/// cancel from another thread while the chain runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The current global transaction of one call chain.
#[derive(Debug, Default)]
pub struct TransactionContext {
    active: Option<BranchState>,
    suspended: Vec<BranchState>,
    lock_retry: Option<LockRetryPolicy>,
    cancellation: CancellationToken,
}

impl TransactionContext {
    /// A context with no global transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that participates in an existing transaction.
    pub fn from_xid(xid: Xid) -> Self {
        Self {
            active: Some(BranchState::joined(xid)),
            ..Self::default()
        }
    }

    /// Attach a cancellation token shared with the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    // ==================== Inspection ====================

    /// Get the active xid, if any.
    pub fn xid(&self) -> Option<&Xid> {
        self.active.as_ref().map(|b| &b.xid)
    }

    /// Get the status of the active transaction; `None` when unbound.
    pub fn status(&self) -> GlobalStatus {
        self.active
            .as_ref()
            .map(|b| b.status)
            .unwrap_or(GlobalStatus::None)
    }

    pub fn role(&self) -> Option<BranchRole> {
        self.active.as_ref().map(BranchState::role)
    }

    /// Whether a global transaction is bound.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn branch(&self) -> Option<&BranchState> {
        self.active.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|b| b.deadline)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.active.as_ref().is_some_and(|b| b.rollback_only)
    }

    /// Number of transactions currently suspended.
    pub fn suspended_depth(&self) -> usize {
        self.suspended.len()
    }

    /// Lock retry policy in effect for the current call.
    pub fn lock_retry(&self) -> LockRetryPolicy {
        self.lock_retry.unwrap_or_default()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    // ==================== Mutation ====================

    /// Force the active transaction to roll back when it completes.
    pub fn mark_rollback_only(&mut self) -> TransactionResult<()> {
        self.doom(None)
    }

    /// Mark rollback-only and remember `cause` as the reason. The first
    /// recorded cause is kept.
    pub(crate) fn mark_rollback_only_for(&mut self, cause: TransactionError) -> TransactionResult<()> {
        self.doom(Some(cause))
    }

    fn doom(&mut self, cause: Option<TransactionError>) -> TransactionResult<()> {
        let branch = self.active.as_mut().ok_or(TransactionError::NotInTransaction)?;
        if !branch.rollback_only {
            debug!(xid = %branch.xid, cause = ?cause, "transaction marked rollback-only");
            branch.rollback_only = true;
        }
        if branch.rollback_cause.is_none() {
            branch.rollback_cause = cause;
        }
        Ok(())
    }

    /// Suspend the active transaction until the returned scope is dropped.
    ///
    /// With no active transaction the scope is a no-op.
    pub fn suspend(&mut self) -> ContextScope<'_> {
        let lock_retry = self.lock_retry;
        self.enter(true, lock_retry)
    }

    pub(crate) fn enter(
        &mut self,
        suspend: bool,
        lock_retry: Option<LockRetryPolicy>,
    ) -> ContextScope<'_> {
        let suspended = match (suspend, self.active.take()) {
            (true, Some(branch)) => {
                debug!(xid = %branch.xid, depth = self.suspended.len() + 1, "suspending transaction");
                self.suspended.push(branch);
                true
            }
            (_, active) => {
                self.active = active;
                false
            }
        };

        let previous_lock_retry = std::mem::replace(&mut self.lock_retry, lock_retry);

        ContextScope {
            ctx: self,
            suspended,
            joined: false,
            previous_lock_retry,
        }
    }

    pub(crate) fn bind(&mut self, branch: BranchState) {
        self.active = Some(branch);
    }

    pub(crate) fn unbind(&mut self) -> Option<BranchState> {
        self.active.take()
    }

    pub(crate) fn set_status(&mut self, status: GlobalStatus) {
        if let Some(branch) = self.active.as_mut() {
            branch.status = status;
        }
    }
}

/// Restores the context to its state before a suspension or call.
///
/// Dereferences to the [`TransactionContext`] so the enclosed work can use
/// the context as usual.
pub struct ContextScope<'a> {
    ctx: &'a mut TransactionContext,
    suspended: bool,
    joined: bool,
    previous_lock_retry: Option<LockRetryPolicy>,
}

impl ContextScope<'_> {
    /// Whether this scope suspended a transaction.
    pub fn has_suspended(&self) -> bool {
        self.suspended
    }

    /// Run the rest of this scope as a participant of the active branch.
    pub(crate) fn mark_joined(&mut self) {
        if self.joined {
            return;
        }
        if let Some(branch) = self.ctx.active.as_mut() {
            branch.joins += 1;
            self.joined = true;
        }
    }
}

impl Deref for ContextScope<'_> {
    type Target = TransactionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        if self.joined {
            if let Some(branch) = self.ctx.active.as_mut() {
                branch.joins = branch.joins.saturating_sub(1);
            }
        }
        if self.suspended {
            if let Some(leftover) = self.ctx.active.take() {
                debug!(xid = %leftover.xid, "unbinding transaction left active at scope exit");
            }
            self.ctx.active = self.ctx.suspended.pop();
            if let Some(resumed) = &self.ctx.active {
                debug!(xid = %resumed.xid, depth = self.ctx.suspended.len(), "resumed transaction");
            }
        }
        self.ctx.lock_retry = self.previous_lock_retry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn xid(s: &str) -> Xid {
        Xid::new(s).unwrap()
    }

    #[test]
    fn test_new_context_is_unbound() {
        let ctx = TransactionContext::new();
        assert!(!ctx.is_active());
        assert_eq!(ctx.status(), GlobalStatus::None);
        assert!(ctx.xid().is_none());
        assert!(ctx.role().is_none());
    }

    #[test]
    fn test_from_xid_joins_as_participant() {
        let ctx = TransactionContext::from_xid(xid("tx001"));
        assert_eq!(ctx.status(), GlobalStatus::Active);
        assert_eq!(ctx.xid(), Some(&xid("tx001")));
        assert_eq!(ctx.role(), Some(BranchRole::Participant));
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut ctx = TransactionContext::from_xid(xid("outer"));
        {
            let mut scope = ctx.suspend();
            assert!(scope.has_suspended());
            assert!(!scope.is_active());
            assert_eq!(scope.suspended_depth(), 1);

            scope.bind(BranchState::launched(
                xid("inner"),
                "inner",
                Some(Instant::now() + Duration::from_secs(1)),
            ));
            assert_eq!(scope.xid(), Some(&xid("inner")));
        }
        assert_eq!(ctx.xid(), Some(&xid("outer")));
        assert_eq!(ctx.suspended_depth(), 0);
    }

    #[test]
    fn test_nested_suspension_is_lifo() {
        let mut ctx = TransactionContext::from_xid(xid("a"));
        {
            let mut first = ctx.suspend();
            first.bind(BranchState::joined(xid("b")));
            {
                let second = first.suspend();
                assert_eq!(second.suspended_depth(), 2);
            }
            assert_eq!(first.xid(), Some(&xid("b")));
        }
        assert_eq!(ctx.xid(), Some(&xid("a")));
    }

    #[test]
    fn test_suspend_without_active_is_noop() {
        let mut ctx = TransactionContext::new();
        {
            let scope = ctx.suspend();
            assert!(!scope.has_suspended());
            assert_eq!(scope.suspended_depth(), 0);
        }
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_scope_restores_on_unwind() {
        let mut ctx = TransactionContext::from_xid(xid("outer"));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = ctx.suspend();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.xid(), Some(&xid("outer")));
        assert_eq!(ctx.suspended_depth(), 0);
    }

    #[test]
    fn test_scope_restores_lock_policy() {
        let mut ctx = TransactionContext::new();
        let custom = LockRetryPolicy::new(1, Duration::from_millis(5));
        {
            let scope = ctx.enter(false, Some(custom));
            assert_eq!(scope.lock_retry(), custom);
        }
        assert_eq!(ctx.lock_retry(), LockRetryPolicy::default());
    }

    #[test]
    fn test_mark_rollback_only() {
        let mut ctx = TransactionContext::new();
        assert_eq!(ctx.mark_rollback_only(), Err(TransactionError::NotInTransaction));

        let mut ctx = TransactionContext::from_xid(xid("tx"));
        ctx.mark_rollback_only().unwrap();
        assert!(ctx.is_rollback_only());
    }

    #[test]
    fn test_first_rollback_cause_kept() {
        let mut ctx = TransactionContext::from_xid(xid("tx"));
        let timeout = TransactionError::Timeout { xid: xid("tx") };
        ctx.mark_rollback_only_for(timeout.clone()).unwrap();
        ctx.mark_rollback_only_for(TransactionError::Cancelled { xid: xid("tx") })
            .unwrap();
        assert_eq!(ctx.branch().unwrap().rollback_cause(), Some(&timeout));
    }

    #[test]
    fn test_joined_scope_reports_participant() {
        let mut ctx = TransactionContext::new();
        ctx.bind(BranchState::launched(xid("tx"), "tx", None));
        {
            let mut scope = ctx.enter(false, None);
            scope.mark_joined();
            assert_eq!(scope.role(), Some(BranchRole::Participant));
            {
                // a new branch begun inside the join is its own launcher
                let mut inner = scope.suspend();
                inner.bind(BranchState::launched(xid("inner"), "inner", None));
                assert_eq!(inner.role(), Some(BranchRole::Launcher));
            }
            assert!(scope.branch().unwrap().is_joined());
        }
        assert_eq!(ctx.role(), Some(BranchRole::Launcher));
    }

    #[test]
    fn test_joined_scope_released_on_unwind() {
        let mut ctx = TransactionContext::new();
        ctx.bind(BranchState::launched(xid("tx"), "tx", None));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = ctx.enter(false, None);
            scope.mark_joined();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.role(), Some(BranchRole::Launcher));
    }

    #[test]
    fn test_cancellation_shared() {
        let token = CancellationToken::new();
        let ctx = TransactionContext::new().with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
