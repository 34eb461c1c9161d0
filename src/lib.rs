//! globaltx - Global Transaction Propagation for Rust
//!
//! This crate runs operations inside distributed transactions managed by an
//! external coordinator. Each call declares how it relates to the caller's
//! transaction (join, begin anew, suspend, refuse) and which errors roll the
//! transaction back; the manager begins, commits, or rolls back accordingly
//! and keeps the caller's context intact across nesting.
//!
//! # Example
//!
//! ```
//! use globaltx::config::GlobalTransactional;
//! use globaltx::coordinator::InMemoryCoordinator;
//! use globaltx::rollback::{Classify, ErrorClass};
//! use globaltx::transaction::{Propagation, TransactionContext, TransactionManager};
//!
//! static INSUFFICIENT_FUNDS: ErrorClass = ErrorClass::root("InsufficientFunds");
//!
//! #[derive(Debug)]
//! struct InsufficientFunds;
//!
//! impl Classify for InsufficientFunds {
//!     fn error_class(&self) -> &'static ErrorClass {
//!         &INSUFFICIENT_FUNDS
//!     }
//! }
//!
//! let manager = TransactionManager::new(InMemoryCoordinator::new());
//! let config = manager
//!     .configure(
//!         &GlobalTransactional::new()
//!             .name("withdraw")
//!             .propagation(Propagation::RequiresNew)
//!             .rollback_for(&INSUFFICIENT_FUNDS),
//!     )
//!     .unwrap();
//!
//! let mut ctx = TransactionContext::new();
//! let outcome = manager
//!     .execute(&config, &mut ctx, |_| Err::<u64, _>(InsufficientFunds))
//!     .unwrap();
//!
//! assert!(outcome.is_rolled_back());
//! ```

#![allow(dead_code)] // Several accessors exist for embedding callers only

pub mod config;
pub mod coordinator;
pub mod lock;
pub mod rollback;
pub mod transaction;
