//! Transaction configuration.
//!
//! A call site declares its settings with [`GlobalTransactional`]; the
//! declaration is resolved once against process-wide [`GlobalDefaults`] and
//! an [`ErrorClassRegistry`](crate::rollback::ErrorClassRegistry) into an
//! immutable [`TransactionConfig`].
//!
//! # Usage
//!
//! ```
//! use globaltx::config::{GlobalDefaults, GlobalTransactional};
//! use globaltx::rollback::ErrorClassRegistry;
//! use globaltx::transaction::Propagation;
//!
//! let config = GlobalTransactional::new()
//!     .name("place-order")
//!     .timeout_ms(30_000)
//!     .propagation(Propagation::RequiresNew)
//!     .lock_retry_times(3)
//!     .resolve(&GlobalDefaults::default(), &ErrorClassRegistry::new())
//!     .unwrap();
//!
//! assert_eq!(config.name(), "place-order");
//! ```

mod declaration;
mod defaults;
mod error;

pub use declaration::{GlobalTransactional, TransactionConfig};
pub use defaults::{
    GlobalDefaults, DEFAULT_GLOBAL_TRANSACTION_TIMEOUT, DEFAULT_LOCK_RETRY_INTERVAL,
    DEFAULT_LOCK_RETRY_TIMES,
};
pub use error::{ConfigError, ConfigResult};
