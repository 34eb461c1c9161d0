//! Core value types for global transactions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one global transaction instance.
///
/// Xids travel as opaque tokens in outbound call metadata, so they are
/// restricted to printable, non-whitespace ASCII.
///
/// Valid xids:
/// - 1-128 characters
/// - No whitespace or control characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Xid(String);

impl Xid {
    const MAX_LEN: usize = 128;

    /// create a new Xid, validating the input
    pub fn new(xid: impl Into<String>) -> Result<Self, InvalidXidError> {
        let xid = xid.into();
        Self::validate(&xid)?;
        Ok(Self(xid))
    }

    fn validate(xid: &str) -> Result<(), InvalidXidError> {
        if xid.is_empty() {
            return Err(InvalidXidError::Empty);
        }

        if xid.len() > Self::MAX_LEN {
            return Err(InvalidXidError::TooLong(xid.len()));
        }

        for (i, c) in xid.chars().enumerate() {
            if !c.is_ascii_graphic() {
                return Err(InvalidXidError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Xid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Xid {
    type Error = InvalidXidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Xid> for String {
    fn from(xid: Xid) -> Self {
        xid.0
    }
}

/// Why a string was rejected as an xid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidXidError {
    #[error("xid cannot be empty")]
    Empty,

    #[error("xid too long: {0} characters (max 128)")]
    TooLong(usize),

    #[error("invalid character {char:?} at position {position}")]
    InvalidCharacter { char: char, position: usize },
}

/// Status of a global transaction as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GlobalStatus {
    /// No global transaction is bound.
    #[default]
    None,
    Active,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    /// The coordinator failed to complete the requested commit or rollback.
    /// The real outcome must be reconciled externally.
    Failed,
}

impl GlobalStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GlobalStatus::Committed | GlobalStatus::RolledBack | GlobalStatus::Failed
        )
    }
}

impl fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GlobalStatus::None => "none",
            GlobalStatus::Active => "active",
            GlobalStatus::Committing => "committing",
            GlobalStatus::Committed => "committed",
            GlobalStatus::RollingBack => "rolling back",
            GlobalStatus::RolledBack => "rolled back",
            GlobalStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// How the current call participates in the bound transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchRole {
    /// Began the transaction and owns the commit/rollback decision.
    Launcher,
    /// Joined an existing transaction, locally or from a carried token.
    Participant,
}

impl fmt::Display for BranchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchRole::Launcher => write!(f, "launcher"),
            BranchRole::Participant => write!(f, "participant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_xids() {
        assert!(Xid::new("192.168.0.1:8091:2000042").is_ok());
        assert!(Xid::new("01hx5v3k9q").is_ok());
    }

    #[test]
    fn test_invalid_xids() {
        assert_eq!(Xid::new(""), Err(InvalidXidError::Empty));
        assert_eq!(Xid::new("a".repeat(129)), Err(InvalidXidError::TooLong(129)));
        assert_eq!(
            Xid::new("tx 1"),
            Err(InvalidXidError::InvalidCharacter { char: ' ', position: 2 })
        );
    }

    #[test]
    fn test_xid_serde_validates() {
        let xid: Xid = serde_json::from_str("\"tx-1\"").unwrap();
        assert_eq!(xid.as_str(), "tx-1");
        assert!(serde_json::from_str::<Xid>("\"\"").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(GlobalStatus::Committed.is_terminal());
        assert!(GlobalStatus::RolledBack.is_terminal());
        assert!(GlobalStatus::Failed.is_terminal());
        assert!(!GlobalStatus::Active.is_terminal());
        assert!(!GlobalStatus::None.is_terminal());
    }
}
