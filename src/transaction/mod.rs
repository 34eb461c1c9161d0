//! Global transaction propagation and orchestration.
//!
//! This module runs operations inside distributed (global) transactions.
//! The [`TransactionManager`] decides per call whether to begin a new
//! transaction, join the caller's, suspend it, or refuse to run, then
//! commits or rolls back what it began according to the call's rollback
//! rules. Callers in other processes join through the xid carried in call
//! metadata (see [`inject`] and [`extract`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │  (Propagation, begin/commit/rollback, forced rollback)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Transaction │       │  Rollback   │       │   Lock      │
//!  │   Context   │       │   Rules     │       │   Retry     │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!        │                                           │
//!        ▼                                           ▼
//!  ┌─────────────┐                           ┌─────────────┐
//!  │   Carrier   │                           │ Coordinator │
//!  │  (TX_XID)   │                           │   Client    │
//!  └─────────────┘                           └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use globaltx::config::GlobalTransactional;
//! use globaltx::coordinator::InMemoryCoordinator;
//! use globaltx::transaction::{Propagation, TransactionContext, TransactionError, TransactionManager};
//!
//! let manager = TransactionManager::new(InMemoryCoordinator::new());
//! let config = manager
//!     .configure(&GlobalTransactional::new().name("transfer").propagation(Propagation::Required))
//!     .unwrap();
//!
//! let mut ctx = TransactionContext::new();
//! let outcome = manager
//!     .execute(&config, &mut ctx, |ctx| {
//!         manager.acquire_lock(ctx, "account:1")?;
//!         Ok::<_, TransactionError>(100)
//!     })
//!     .unwrap();
//!
//! assert!(outcome.is_committed());
//! assert!(!ctx.is_active());
//! ```

mod carrier;
mod context;
mod error;
mod hook;
mod manager;
mod outcome;
mod propagation;
mod types;

pub use carrier::{extract, inject, Carrier, XID_HEADER};
pub use context::{BranchState, CancellationToken, ContextScope, TransactionContext};
pub use error::{
    TransactionError, TransactionResult, COORDINATOR_ERROR, LOCK_CONFLICT, PROPAGATION_VIOLATION,
    TRANSACTION_ERROR, TRANSACTION_TIMEOUT,
};
pub use hook::TransactionHook;
pub use manager::TransactionManager;
pub use outcome::{ExecutionError, Outcome};
pub use propagation::{Propagation, PropagationDecision};
pub use types::{BranchRole, GlobalStatus, InvalidXidError, Xid};
