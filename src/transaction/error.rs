//! Transaction error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coordinator::CoordinatorError;
use crate::rollback::{Classify, ErrorClass};
use crate::transaction::propagation::Propagation;
use crate::transaction::types::{InvalidXidError, Xid};

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur while orchestrating a global transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The call site's declaration could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A NEVER or MANDATORY constraint was broken.
    #[error("{}", violation_display(.propagation, .existing))]
    PropagationViolation {
        propagation: Propagation,
        /// The transaction that was active, if any.
        existing: Option<Xid>,
    },

    /// The coordinator did not start the transaction.
    #[error("failed to begin global transaction '{name}': {source}")]
    BeginFailure {
        name: String,
        #[source]
        source: CoordinatorError,
    },

    /// The lock retry budget was exhausted.
    #[error("global lock conflict on {resource_key} for {xid} after {attempts} attempts")]
    LockConflict {
        xid: Xid,
        resource_key: String,
        attempts: u32,
    },

    /// The coordinator failed to commit. The outcome is indeterminate.
    #[error("failed to commit global transaction {xid}: {source}")]
    CommitFailure {
        xid: Xid,
        #[source]
        source: CoordinatorError,
    },

    /// The coordinator failed to roll back. The outcome is indeterminate.
    #[error("failed to roll back global transaction {xid}: {source}")]
    RollbackFailure {
        xid: Xid,
        #[source]
        source: CoordinatorError,
    },

    /// The branch deadline passed.
    #[error("global transaction {xid} exceeded its deadline")]
    Timeout { xid: Xid },

    /// The caller abandoned the operation.
    #[error("global transaction {xid} was cancelled")]
    Cancelled { xid: Xid },

    /// The transaction was marked rollback-only by a participant.
    #[error("global transaction {xid} was marked rollback-only")]
    RollbackOnly { xid: Xid },

    /// A coordinator request other than begin/commit/rollback failed.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// A carried xid token was malformed.
    #[error("invalid xid: {0}")]
    InvalidXid(#[from] InvalidXidError),

    /// The operation needs a global transaction but none is bound.
    #[error("no global transaction is active")]
    NotInTransaction,

    /// Invalid operation for the current context state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

fn violation_display(propagation: &Propagation, existing: &Option<Xid>) -> String {
    match existing {
        Some(xid) => format!(
            "propagation {} forbids an active transaction, found {}",
            propagation, xid
        ),
        None => format!(
            "propagation {} requires an active transaction, found none",
            propagation
        ),
    }
}

impl TransactionError {
    /// Check if the whole transaction may succeed when run again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransactionError::LockConflict { .. } | TransactionError::Timeout { .. }
        )
    }

    /// Check if this error forces the enclosing transaction to roll back.
    pub fn forces_rollback(&self) -> bool {
        matches!(
            self,
            TransactionError::LockConflict { .. }
                | TransactionError::Timeout { .. }
                | TransactionError::Cancelled { .. }
                | TransactionError::RollbackOnly { .. }
        )
    }

    /// Check if the global outcome needs external reconciliation.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            TransactionError::CommitFailure { .. } | TransactionError::RollbackFailure { .. }
        )
    }
}

/// Root class of every [`TransactionError`].
pub static TRANSACTION_ERROR: ErrorClass = ErrorClass::root("TransactionError");
pub static PROPAGATION_VIOLATION: ErrorClass =
    ErrorClass::extends("PropagationViolation", &TRANSACTION_ERROR);
pub static LOCK_CONFLICT: ErrorClass = ErrorClass::extends("LockConflict", &TRANSACTION_ERROR);
pub static TRANSACTION_TIMEOUT: ErrorClass = ErrorClass::extends("Timeout", &TRANSACTION_ERROR);
pub static COORDINATOR_ERROR: ErrorClass =
    ErrorClass::extends("CoordinatorError", &TRANSACTION_ERROR);

impl Classify for TransactionError {
    fn error_class(&self) -> &'static ErrorClass {
        match self {
            TransactionError::PropagationViolation { .. } => &PROPAGATION_VIOLATION,
            TransactionError::LockConflict { .. } => &LOCK_CONFLICT,
            TransactionError::Timeout { .. } => &TRANSACTION_TIMEOUT,
            TransactionError::BeginFailure { .. }
            | TransactionError::CommitFailure { .. }
            | TransactionError::RollbackFailure { .. }
            | TransactionError::Coordinator(_) => &COORDINATOR_ERROR,
            _ => &TRANSACTION_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xid() -> Xid {
        Xid::new("tx001").unwrap()
    }

    #[test]
    fn test_error_retryable() {
        let conflict = TransactionError::LockConflict {
            xid: xid(),
            resource_key: "users:1".to_string(),
            attempts: 4,
        };
        assert!(conflict.is_retryable());
        assert!(conflict.forces_rollback());

        let not_active = TransactionError::NotInTransaction;
        assert!(!not_active.is_retryable());
        assert!(!not_active.forces_rollback());
    }

    #[test]
    fn test_indeterminate() {
        let err = TransactionError::CommitFailure {
            xid: xid(),
            source: CoordinatorError::Timeout,
        };
        assert!(err.is_indeterminate());
        assert!(!TransactionError::Timeout { xid: xid() }.is_indeterminate());
    }

    #[test]
    fn test_violation_messages() {
        let never = TransactionError::PropagationViolation {
            propagation: Propagation::Never,
            existing: Some(xid()),
        };
        assert!(never.to_string().contains("NEVER"));
        assert!(never.to_string().contains("tx001"));

        let mandatory = TransactionError::PropagationViolation {
            propagation: Propagation::Mandatory,
            existing: None,
        };
        assert!(mandatory.to_string().contains("requires an active transaction"));
    }

    #[test]
    fn test_classes() {
        let conflict = TransactionError::LockConflict {
            xid: xid(),
            resource_key: "k".to_string(),
            attempts: 1,
        };
        assert_eq!(conflict.error_class(), &LOCK_CONFLICT);
        assert!(conflict.error_class().is_subclass_of(&TRANSACTION_ERROR));
        assert_eq!(TransactionError::NotInTransaction.error_class(), &TRANSACTION_ERROR);
    }
}
