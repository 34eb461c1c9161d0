//! Lifecycle hooks for launched transactions.

use crate::transaction::types::{GlobalStatus, Xid};

/// Callbacks around the lifecycle of a transaction this process launched.
///
/// Participants never trigger hooks; the launcher owns the lifecycle. Every
/// method defaults to a no-op. Hooks must not panic.
pub trait TransactionHook: Send + Sync {
    fn before_begin(&self, _name: &str) {}

    fn after_begin(&self, _xid: &Xid) {}

    fn before_commit(&self, _xid: &Xid) {}

    fn after_commit(&self, _xid: &Xid) {}

    fn before_rollback(&self, _xid: &Xid) {}

    fn after_rollback(&self, _xid: &Xid) {}

    /// Called once the transaction reaches a terminal status, including
    /// when the coordinator failed to complete it.
    fn after_completion(&self, _xid: &Xid, _status: GlobalStatus) {}
}
