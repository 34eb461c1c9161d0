//! Global lock acquisition with bounded retry.
//!
//! The lock itself lives in the coordinator. This module only decides how
//! often to ask for it: `times + 1` attempts with a fixed `interval` between
//! them, ending in [`TransactionError::LockConflict`] when the budget runs out.
//!
//! [`TransactionError::LockConflict`]: crate::transaction::TransactionError::LockConflict

mod policy;
mod retry;

pub use policy::LockRetryPolicy;
pub use retry::LockRetryController;
