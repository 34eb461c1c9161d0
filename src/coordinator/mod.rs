//! Transaction coordinator access.
//!
//! The coordinator is an external service that tracks global transaction
//! state and drives commit/rollback on every branch. This crate only talks
//! to it through [`CoordinatorClient`]; the wire protocol lives elsewhere.
//! [`InMemoryCoordinator`] keeps everything in process for tests and local
//! runs.

mod client;
mod error;
mod memory;

pub use client::{CoordinatorClient, LockAttempt};
pub use error::{CoordinatorError, CoordinatorResult};
pub use memory::{GlobalRecord, InMemoryCoordinator};
