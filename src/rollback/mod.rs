//! Rollback rules.
//!
//! Declared rules are resolved once, when a call site's configuration is
//! built. Rules given by class name are looked up in an
//! [`ErrorClassRegistry`]; an unknown name is a configuration error rather
//! than a rule that silently never matches.

mod class;
mod rules;

pub use class::{Ancestry, Classify, ErrorClass, ErrorClassRegistry};
pub use rules::{CompletionDecision, RollbackRuleSet};
