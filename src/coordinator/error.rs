//! Coordinator client error types.

use thiserror::Error;

use crate::transaction::Xid;

/// Result type for coordinator calls.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors reported by a coordinator client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The coordinator could not be reached.
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    /// The coordinator refused the request.
    #[error("coordinator rejected request: {0}")]
    Rejected(String),

    /// The coordinator does not know the transaction.
    #[error("unknown global transaction: {0}")]
    UnknownTransaction(Xid),

    /// The request did not complete in time.
    #[error("coordinator request timed out")]
    Timeout,

    /// The coordinator returned an xid that is not valid.
    #[error("invalid xid from coordinator: {0}")]
    InvalidXid(#[from] crate::transaction::InvalidXidError),

    #[error("internal coordinator error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// check if the request may succeed when sent again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Unavailable(_) | CoordinatorError::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CoordinatorError::Unavailable("down".into()).is_transient());
        assert!(CoordinatorError::Timeout.is_transient());
        assert!(!CoordinatorError::Rejected("no".into()).is_transient());
    }
}
