//! Rollback rule evaluation.
//!
//! Given the outcome of the wrapped operation, decide whether the global
//! transaction commits or rolls back:
//!
//! 1. No error commits.
//! 2. The error's class hierarchy is walked most specific first. At each
//!    level an exclusion (`no_rollback_on`) commits, otherwise an inclusion
//!    (`rollback_on`) rolls back. The most specific matching level wins, and
//!    exclusion wins a tie on the same level.
//! 3. When nothing matches, roll back unless `rollback_on` was declared, in
//!    which case the error is outside the declared rollback scope and the
//!    transaction commits.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::class::{Classify, ErrorClass};

/// Commit or roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionDecision {
    Commit,
    Rollback,
}

impl fmt::Display for CompletionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionDecision::Commit => write!(f, "commit"),
            CompletionDecision::Rollback => write!(f, "rollback"),
        }
    }
}

/// Resolved rollback rules for one transactional call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackRuleSet {
    rollback_on: Vec<&'static ErrorClass>,
    no_rollback_on: Vec<&'static ErrorClass>,
}

impl RollbackRuleSet {
    /// An empty rule set: roll back on any error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll back when the error is `class` or derives from it.
    pub fn rollback_on(mut self, class: &'static ErrorClass) -> Self {
        self.add_rollback_on(class);
        self
    }

    /// Do not roll back when the error is `class` or derives from it.
    pub fn no_rollback_on(mut self, class: &'static ErrorClass) -> Self {
        self.add_no_rollback_on(class);
        self
    }

    pub(crate) fn add_rollback_on(&mut self, class: &'static ErrorClass) {
        if !self.rollback_on.contains(&class) {
            self.rollback_on.push(class);
        }
    }

    pub(crate) fn add_no_rollback_on(&mut self, class: &'static ErrorClass) {
        if !self.no_rollback_on.contains(&class) {
            self.no_rollback_on.push(class);
        }
    }

    pub fn rollback_classes(&self) -> &[&'static ErrorClass] {
        &self.rollback_on
    }

    pub fn no_rollback_classes(&self) -> &[&'static ErrorClass] {
        &self.no_rollback_on
    }

    pub fn is_empty(&self) -> bool {
        self.rollback_on.is_empty() && self.no_rollback_on.is_empty()
    }

    /// Decide for the outcome of an operation.
    pub fn decide<T, E: Classify>(&self, outcome: &Result<T, E>) -> CompletionDecision {
        match outcome {
            Ok(_) => CompletionDecision::Commit,
            Err(e) => self.decide_class(e.error_class()),
        }
    }

    /// Decide for an error of the given class.
    pub fn decide_class(&self, class: &'static ErrorClass) -> CompletionDecision {
        for level in class.ancestry() {
            if self.no_rollback_on.contains(&level) {
                return CompletionDecision::Commit;
            }
            if self.rollback_on.contains(&level) {
                return CompletionDecision::Rollback;
            }
        }

        if self.rollback_on.is_empty() {
            CompletionDecision::Rollback
        } else {
            CompletionDecision::Commit
        }
    }
}
