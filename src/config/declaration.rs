//! Transactional declarations and their resolved configuration.

use std::time::Duration;

use crate::config::defaults::GlobalDefaults;
use crate::config::error::{ConfigError, ConfigResult};
use crate::lock::LockRetryPolicy;
use crate::rollback::{ErrorClass, ErrorClassRegistry, RollbackRuleSet};
use crate::transaction::Propagation;

/// Declared settings for one transactional call site.
///
/// Every setting is optional. Unset values defer to [`GlobalDefaults`] when
/// the declaration is [resolved](GlobalTransactional::resolve).
#[derive(Debug, Clone)]
pub struct GlobalTransactional {
    name: String,
    timeout_ms: Option<u64>,
    propagation: Propagation,
    rollback_for: Vec<&'static ErrorClass>,
    rollback_for_class_name: Vec<String>,
    no_rollback_for: Vec<&'static ErrorClass>,
    no_rollback_for_class_name: Vec<String>,
    lock_retry_times: i32,
    lock_retry_interval_ms: i64,
}

impl Default for GlobalTransactional {
    fn default() -> Self {
        Self {
            name: String::new(),
            timeout_ms: None,
            propagation: Propagation::default(),
            rollback_for: Vec::new(),
            rollback_for_class_name: Vec::new(),
            no_rollback_for: Vec::new(),
            no_rollback_for_class_name: Vec::new(),
            lock_retry_times: -1,
            lock_retry_interval_ms: 0,
        }
    }
}

impl GlobalTransactional {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label shown by the coordinator.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Branch-wide deadline in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn rollback_for(mut self, class: &'static ErrorClass) -> Self {
        self.rollback_for.push(class);
        self
    }

    /// Roll back for a class given by name, resolved against the registry.
    pub fn rollback_for_class_name(mut self, name: impl Into<String>) -> Self {
        self.rollback_for_class_name.push(name.into());
        self
    }

    pub fn no_rollback_for(mut self, class: &'static ErrorClass) -> Self {
        self.no_rollback_for.push(class);
        self
    }

    /// Skip rollback for a class given by name, resolved against the registry.
    pub fn no_rollback_for_class_name(mut self, name: impl Into<String>) -> Self {
        self.no_rollback_for_class_name.push(name.into());
        self
    }

    /// Lock retries after the first attempt. Negative defers to the defaults.
    pub fn lock_retry_times(mut self, times: i32) -> Self {
        self.lock_retry_times = times;
        self
    }

    /// Wait between lock attempts. Zero or negative defers to the defaults.
    pub fn lock_retry_interval_ms(mut self, interval_ms: i64) -> Self {
        self.lock_retry_interval_ms = interval_ms;
        self
    }

    /// Resolve this declaration into an immutable [`TransactionConfig`].
    ///
    /// Class names are looked up in `registry` here, once; an unknown name
    /// fails with [`ConfigError::UnknownErrorClass`].
    pub fn resolve(
        &self,
        defaults: &GlobalDefaults,
        registry: &ErrorClassRegistry,
    ) -> ConfigResult<TransactionConfig> {
        let timeout = match self.timeout_ms {
            Some(0) => return Err(ConfigError::InvalidTimeout { timeout_ms: 0 }),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.effective_timeout(),
        };

        let mut rules = RollbackRuleSet::new();
        for &class in &self.rollback_for {
            rules.add_rollback_on(class);
        }
        for name in &self.rollback_for_class_name {
            rules.add_rollback_on(lookup(registry, name)?);
        }
        for &class in &self.no_rollback_for {
            rules.add_no_rollback_on(class);
        }
        for name in &self.no_rollback_for_class_name {
            rules.add_no_rollback_on(lookup(registry, name)?);
        }

        Ok(TransactionConfig {
            name: self.name.clone(),
            timeout,
            propagation: self.propagation,
            rules,
            lock_retry: LockRetryPolicy::resolve(
                self.lock_retry_times,
                self.lock_retry_interval_ms,
                defaults,
            ),
        })
    }
}

fn lookup(registry: &ErrorClassRegistry, name: &str) -> ConfigResult<&'static ErrorClass> {
    registry
        .resolve(name)
        .ok_or_else(|| ConfigError::UnknownErrorClass {
            name: name.to_string(),
        })
}

/// Fully resolved settings for one transactional call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    name: String,
    timeout: Duration,
    propagation: Propagation,
    rules: RollbackRuleSet,
    lock_retry: LockRetryPolicy,
}

impl TransactionConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn rules(&self) -> &RollbackRuleSet {
        &self.rules
    }

    pub fn lock_retry(&self) -> LockRetryPolicy {
        self.lock_retry
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            timeout: GlobalDefaults::default().effective_timeout(),
            propagation: Propagation::default(),
            rules: RollbackRuleSet::new(),
            lock_retry: LockRetryPolicy::default(),
        }
    }
}
