//! Relation and status enums
//!
//! A directed pair carries two orthogonal axes: the decision the receiving
//! agent's oracles reached, and the feedback the human user gave afterwards.
//! They live side by side in a ledger entry and are never conflated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Agent-level outcome of one negotiation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No oracle has evaluated this direction yet.
    Uncontacted,
    /// The receiving agent's oracle accepted the connection.
    Accepted,
    /// The receiving agent's oracle refused the connection.
    Refused,
}

/// Human-level confirmation of one negotiation direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// The user has not confirmed or rejected the pairing yet.
    #[default]
    Uncontacted,
    /// The user confirmed the pairing.
    UserAccepted,
    /// The user rejected the pairing.
    UserRefused,
}

impl Feedback {
    /// Translates the boundary-layer boolean into a feedback value.
    pub fn from_accepted(accepted: bool) -> Self {
        if accepted {
            Feedback::UserAccepted
        } else {
            Feedback::UserRefused
        }
    }
}

/// Outcome of an operation, reported as a value rather than an error when
/// the failure is part of normal protocol flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The operation completed successfully.
    Completed,
    /// The operation failed; no state was mutated.
    Failed,
    /// The operation was already performed earlier; this call was a no-op.
    Repeated,
}

/// How one policy rule contributed to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    /// The rule supported accepting the connection.
    Positive,
    /// The rule was partially or fully violated and supported refusal.
    Negative,
    /// The rule was applied against private information.
    Private,
    /// The rule played no part in the decision.
    Unused,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Uncontacted => "uncontacted",
            Decision::Accepted => "accepted",
            Decision::Refused => "refused",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Feedback::Uncontacted => "uncontacted",
            Feedback::UserAccepted => "user_accepted",
            Feedback::UserRefused => "user_refused",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_from_accepted() {
        assert_eq!(Feedback::from_accepted(true), Feedback::UserAccepted);
        assert_eq!(Feedback::from_accepted(false), Feedback::UserRefused);
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(
            serde_json::to_string(&Decision::Accepted).unwrap(),
            "\"accepted\""
        );
        assert_eq!(
            serde_json::to_string(&Decision::Uncontacted).unwrap(),
            "\"uncontacted\""
        );
    }

    #[test]
    fn test_feedback_serialization() {
        assert_eq!(
            serde_json::to_string(&Feedback::UserRefused).unwrap(),
            "\"user_refused\""
        );
    }

    #[test]
    fn test_axes_are_distinct_types() {
        // A decision can never be compared against a feedback value; the
        // compiler enforces the separation. This test documents the shape.
        let decision = Decision::Accepted;
        let feedback = Feedback::UserAccepted;
        assert_eq!(format!("{decision}"), "accepted");
        assert_eq!(format!("{feedback}"), "user_accepted");
    }
}
