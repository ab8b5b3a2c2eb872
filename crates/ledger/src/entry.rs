//! Per-direction ledger entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Decision, Feedback, Usage};
use std::collections::BTreeMap;

/// One oracle's recorded verdict on a pairing request, with the rationale it
/// gave and the policy-usage evidence parsed out of its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedVerdict {
    pub decision: Decision,
    pub rationale: String,
    /// Which of the receiver's policy rules contributed, and how.
    pub evidence: Vec<(String, Usage)>,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedVerdict {
    pub fn now(decision: Decision, rationale: String, evidence: Vec<(String, Usage)>) -> Self {
        Self {
            decision,
            rationale,
            evidence,
            recorded_at: Utc::now(),
        }
    }
}

/// State of one direction of a pair: the verdicts of the receiving agent's
/// oracles, keyed by oracle name, and the receiving user's feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub verdicts: BTreeMap<String, RecordedVerdict>,
    pub feedback: Feedback,
}

impl LedgerEntry {
    /// Collapses the per-oracle verdicts into a single agent-level decision:
    /// any acceptance wins, verdicts with no acceptance refuse, no verdicts
    /// at all means the direction is still a placeholder.
    pub fn agent_decision(&self) -> Decision {
        if self.verdicts.is_empty() {
            return Decision::Uncontacted;
        }
        if self
            .verdicts
            .values()
            .any(|verdict| verdict.decision == Decision::Accepted)
        {
            Decision::Accepted
        } else {
            Decision::Refused
        }
    }

    /// True once the collapse rule yields an acceptance.
    pub fn accepted_by_agent(&self) -> bool {
        self.agent_decision() == Decision::Accepted
    }

    /// True while no oracle has spoken for this direction.
    pub fn is_placeholder(&self) -> bool {
        self.verdicts.is_empty()
    }
}
