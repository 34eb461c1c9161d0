//! Results of transactional execution.

use std::error::Error;
use std::fmt;

use crate::rollback::CompletionDecision;
use crate::transaction::error::TransactionError;
use crate::transaction::types::{BranchRole, GlobalStatus, Xid};

/// What happened to one transactional call.
///
/// The operation's own result is always preserved. Orchestration failures
/// that occurred after the operation ran (commit/rollback failures, forced
/// rollbacks) are reported next to it in [`failure`](Outcome::failure).
#[derive(Debug)]
pub struct Outcome<T, E> {
    pub(crate) result: Result<T, E>,
    pub(crate) xid: Option<Xid>,
    pub(crate) role: Option<BranchRole>,
    pub(crate) decision: Option<CompletionDecision>,
    pub(crate) status: GlobalStatus,
    pub(crate) failure: Option<TransactionError>,
}

impl<T, E> Outcome<T, E> {
    /// The call ran without a global transaction.
    pub(crate) fn non_transactional(result: Result<T, E>) -> Self {
        Self {
            result,
            xid: None,
            role: None,
            decision: None,
            status: GlobalStatus::None,
            failure: None,
        }
    }

    pub fn result(&self) -> &Result<T, E> {
        &self.result
    }

    /// The transaction the call ran in, if any.
    pub fn xid(&self) -> Option<&Xid> {
        self.xid.as_ref()
    }

    pub fn role(&self) -> Option<BranchRole> {
        self.role
    }

    /// The commit/rollback decision; `None` when no transaction was involved.
    pub fn decision(&self) -> Option<CompletionDecision> {
        self.decision
    }

    /// Status of the transaction when the call returned.
    ///
    /// Terminal for a launcher, `Active` for a participant.
    pub fn status(&self) -> GlobalStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&TransactionError> {
        self.failure.as_ref()
    }

    pub fn is_committed(&self) -> bool {
        self.status == GlobalStatus::Committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.status == GlobalStatus::RolledBack
    }

    pub fn into_parts(self) -> (Result<T, E>, Option<TransactionError>) {
        (self.result, self.failure)
    }

    /// Collapse into a single result.
    ///
    /// An operation error always wins and carries any orchestration failure
    /// with it. A successful operation is only returned when orchestration
    /// also succeeded.
    pub fn into_result(self) -> Result<T, ExecutionError<E>> {
        match (self.result, self.failure) {
            (Ok(value), None) => Ok(value),
            (Ok(_), Some(failure)) => Err(ExecutionError::Transaction(failure)),
            (Err(source), failure) => Err(ExecutionError::Operation { source, failure }),
        }
    }
}

/// Error from [`TransactionManager::run`](crate::transaction::TransactionManager::run).
#[derive(Debug)]
pub enum ExecutionError<E> {
    /// The wrapped operation failed.
    Operation {
        source: E,
        /// Orchestration failure that happened alongside.
        failure: Option<TransactionError>,
    },
    /// Orchestration failed; the operation either never ran or its result
    /// could not be made durable.
    Transaction(TransactionError),
}

impl<E> ExecutionError<E> {
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ExecutionError::Operation { source, .. } => Some(source),
            ExecutionError::Transaction(_) => None,
        }
    }

    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            ExecutionError::Operation { failure, .. } => failure.as_ref(),
            ExecutionError::Transaction(e) => Some(e),
        }
    }
}

impl<E> From<TransactionError> for ExecutionError<E> {
    fn from(e: TransactionError) -> Self {
        ExecutionError::Transaction(e)
    }
}

impl<E: fmt::Display> fmt::Display for ExecutionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Operation {
                source,
                failure: Some(failure),
            } => write!(f, "operation failed: {} (also: {})", source, failure),
            ExecutionError::Operation { source, failure: None } => {
                write!(f, "operation failed: {}", source)
            }
            ExecutionError::Transaction(e) => write!(f, "{}", e),
        }
    }
}

impl<E: Error + 'static> Error for ExecutionError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecutionError::Operation { source, .. } => Some(source),
            ExecutionError::Transaction(e) => e.source(),
        }
    }
}
