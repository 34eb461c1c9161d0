//! Transaction propagation modes.
//!
//! A propagation mode decides how a transactional call relates to a global
//! transaction that may already be bound to the call chain:
//!
//! | Mode | No active transaction | Active transaction |
//! |---|---|---|
//! | `REQUIRED` | begin new | join |
//! | `REQUIRES_NEW` | begin new | suspend, begin new |
//! | `SUPPORTS` | run without | join |
//! | `NOT_SUPPORTED` | run without | suspend, run without |
//! | `NEVER` | run without | reject |
//! | `MANDATORY` | reject | join |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction propagation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the current transaction, or begin one if none exists.
    #[default]
    Required,

    /// Always begin a new transaction, suspending the current one if present.
    RequiresNew,

    /// Join the current transaction if present, otherwise run without one.
    Supports,

    /// Run without a transaction, suspending the current one if present.
    NotSupported,

    /// Run without a transaction; fail if one is present.
    Never,

    /// Join the current transaction; fail if none is present.
    Mandatory,
}

/// What the orchestrator must do before invoking the wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropagationDecision {
    BeginNew,
    Join,
    SuspendAndBeginNew,
    RunWithout,
    SuspendAndRunWithout,
    Reject,
}

impl Propagation {
    /// All modes, in declaration order.
    pub const ALL: [Propagation; 6] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Never,
        Propagation::Mandatory,
    ];

    /// Evaluate this mode against whether a transaction is already active.
    pub fn decide(&self, has_active: bool) -> PropagationDecision {
        use PropagationDecision::*;

        match (self, has_active) {
            (Propagation::Required, false) => BeginNew,
            (Propagation::Required, true) => Join,
            (Propagation::RequiresNew, false) => BeginNew,
            (Propagation::RequiresNew, true) => SuspendAndBeginNew,
            (Propagation::Supports, false) => RunWithout,
            (Propagation::Supports, true) => Join,
            (Propagation::NotSupported, false) => RunWithout,
            (Propagation::NotSupported, true) => SuspendAndRunWithout,
            (Propagation::Never, false) => RunWithout,
            (Propagation::Never, true) => Reject,
            (Propagation::Mandatory, false) => Reject,
            (Propagation::Mandatory, true) => Join,
        }
    }

    /// Get a human-readable description of this mode.
    pub fn description(&self) -> &'static str {
        match self {
            Propagation::Required => "Join the current transaction or begin a new one",
            Propagation::RequiresNew => "Suspend any current transaction and begin a new one",
            Propagation::Supports => "Join the current transaction if there is one",
            Propagation::NotSupported => "Suspend any current transaction and run without one",
            Propagation::Never => "Run without a transaction, failing if one exists",
            Propagation::Mandatory => "Join the current transaction, failing if none exists",
        }
    }
}

impl PropagationDecision {
    /// Whether the current transaction is pushed onto the suspension stack.
    pub fn suspends(&self) -> bool {
        matches!(
            self,
            PropagationDecision::SuspendAndBeginNew | PropagationDecision::SuspendAndRunWithout
        )
    }

    /// Whether a fresh xid must be requested from the coordinator.
    pub fn begins(&self) -> bool {
        matches!(
            self,
            PropagationDecision::BeginNew | PropagationDecision::SuspendAndBeginNew
        )
    }

    /// Whether the wrapped operation runs inside a global transaction.
    pub fn is_transactional(&self) -> bool {
        self.begins() || matches!(self, PropagationDecision::Join)
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Propagation::Required => write!(f, "REQUIRED"),
            Propagation::RequiresNew => write!(f, "REQUIRES_NEW"),
            Propagation::Supports => write!(f, "SUPPORTS"),
            Propagation::NotSupported => write!(f, "NOT_SUPPORTED"),
            Propagation::Never => write!(f, "NEVER"),
            Propagation::Mandatory => write!(f, "MANDATORY"),
        }
    }
}

/// Parse a propagation mode from its declared name.
impl std::str::FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "REQUIRED" => Ok(Propagation::Required),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            "SUPPORTS" => Ok(Propagation::Supports),
            "NOT_SUPPORTED" => Ok(Propagation::NotSupported),
            "NEVER" => Ok(Propagation::Never),
            "MANDATORY" => Ok(Propagation::Mandatory),
            _ => Err(format!("unknown propagation: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PropagationDecision::*;

    #[test]
    fn test_default_propagation() {
        assert_eq!(Propagation::default(), Propagation::Required);
    }

    #[test]
    fn test_decision_table() {
        let expected = [
            (Propagation::Required, BeginNew, Join),
            (Propagation::RequiresNew, BeginNew, SuspendAndBeginNew),
            (Propagation::Supports, RunWithout, Join),
            (Propagation::NotSupported, RunWithout, SuspendAndRunWithout),
            (Propagation::Never, RunWithout, Reject),
            (Propagation::Mandatory, Reject, Join),
        ];

        for (mode, without, with) in expected {
            assert_eq!(mode.decide(false), without, "{} without context", mode);
            assert_eq!(mode.decide(true), with, "{} with context", mode);
        }
    }

    #[test]
    fn test_decision_flags() {
        assert!(SuspendAndBeginNew.suspends());
        assert!(SuspendAndBeginNew.begins());
        assert!(SuspendAndRunWithout.suspends());
        assert!(!SuspendAndRunWithout.is_transactional());
        assert!(Join.is_transactional());
        assert!(!Join.begins());
        assert!(!Reject.is_transactional());
    }

    #[test]
    fn test_parse_propagation() {
        assert_eq!(
            "REQUIRES_NEW".parse::<Propagation>().unwrap(),
            Propagation::RequiresNew
        );
        assert_eq!(
            "not-supported".parse::<Propagation>().unwrap(),
            Propagation::NotSupported
        );
        assert!("sometimes".parse::<Propagation>().is_err());

        for mode in Propagation::ALL {
            assert_eq!(mode.to_string().parse::<Propagation>().unwrap(), mode);
        }
    }
}
