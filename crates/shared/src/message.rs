//! Messages exchanged between the boundary layer, personal agents and the
//! orchestrator.
//!
//! Every request family is a closed enum matched exhaustively at the
//! receiving end; there is no stringly-typed request kind that can fall
//! through a dispatch silently.

use crate::profile::{AgentId, AgentSnapshot, InfoItem, Profile};
use crate::relation::Decision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle action requested for a personal agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Temporarily stop the agent from joining new negotiations.
    Pause,
    /// Resume a paused agent.
    Resume,
    /// Remove the agent and purge every ledger entry touching it.
    Delete,
    /// Like delete, but the agent stays eligible for a fresh setup.
    Reset,
}

/// Which slice of a user's information a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoQuery {
    Public,
    Private,
    Policies,
    All,
}

/// Read-only projections over the relation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationQuery {
    /// Every entry where the given agent appears on either side.
    AllForUser(AgentId),
    /// Every entry the ledger holds.
    FullLedger,
    /// The set of currently registered agents.
    RegisteredAgents,
    /// Pairs accepted by both agents and still awaiting the user's feedback.
    PendingHumanApproval(AgentId),
    /// Pairs confirmed by both users' feedback.
    Established(AgentId),
    /// This agent's outbound decisions the counterpart has not answered yet.
    SentUnanswered(AgentId),
}

/// Free-text onboarding request for a personal agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub user: AgentId,
    pub content: String,
    /// How permissive the default policies should be when the user's text
    /// leaves a case undecided.
    #[serde(default)]
    pub default_policy_hint: u32,
}

/// Sent by a personal agent to the orchestrator once its profile has been
/// extracted; triggers registration and the matching fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationMessage {
    pub user: AgentId,
    pub snapshot: AgentSnapshot,
}

/// One pairing request delivered to a receiving agent on behalf of a
/// requester. Only the requester's *public* information travels with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    pub requester: AgentId,
    pub requester_information: String,
    pub receiver: AgentId,
    /// Verifier feedback carried into a retry round; empty on first contact.
    #[serde(default)]
    pub feedback: String,
}

/// A single named oracle's answer to a pairing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleAnswer {
    pub decision: Decision,
    pub rationale: String,
}

/// Response to a pairing request: one answer per active oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResponse {
    pub per_oracle: BTreeMap<String, OracleAnswer>,
}

impl PairingResponse {
    /// Fail-closed response: every named oracle reports `Uncontacted` with
    /// the given explanation. Used when the receiver cannot evaluate at all
    /// (not set up, paused, or mis-routed).
    pub fn uncontacted<'a>(
        oracle_names: impl IntoIterator<Item = &'a str>,
        rationale: &str,
    ) -> Self {
        let per_oracle = oracle_names
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    OracleAnswer {
                        decision: Decision::Uncontacted,
                        rationale: rationale.to_string(),
                    },
                )
            })
            .collect();
        Self { per_oracle }
    }

    /// All rationales joined, as fed to the response verifier.
    pub fn rationale_text(&self) -> String {
        self.per_oracle
            .iter()
            .map(|(name, answer)| format!("[{name}] {}", answer.rationale))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True if any oracle answered with a real decision.
    pub fn has_decision(&self) -> bool {
        self.per_oracle
            .values()
            .any(|answer| answer.decision != Decision::Uncontacted)
    }
}

/// A user's information as returned by `GetInfo`, filtered by the query kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_information: Option<Vec<InfoItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_information: Option<Vec<InfoItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<InfoItem>>,
    pub is_setup: bool,
    pub paused: bool,
}

impl UserInformation {
    /// Builds the filtered view of a profile for one query kind.
    pub fn for_query(kind: InfoQuery, profile: Option<&Profile>, paused: bool) -> Self {
        let mut info = UserInformation {
            is_setup: profile.is_some(),
            paused,
            ..Default::default()
        };
        let Some(profile) = profile else {
            return info;
        };
        match kind {
            InfoQuery::Public => {
                info.public_information = Some(profile.public_information.clone());
            }
            InfoQuery::Private => {
                info.private_information = Some(profile.private_information.clone());
            }
            InfoQuery::Policies => {
                info.policies = Some(profile.policies.clone());
            }
            InfoQuery::All => {
                info.public_information = Some(profile.public_information.clone());
                info.private_information = Some(profile.private_information.clone());
                info.policies = Some(profile.policies.clone());
            }
        }
        info
    }
}

/// A user's post-hoc confirmation or rejection of a negotiated pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMessage {
    pub sender: AgentId,
    pub receiver: AgentId,
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::InfoItem;

    fn sample_profile() -> Profile {
        Profile::new(
            vec![InfoItem::new("info_1", "public")],
            vec![InfoItem::new("priv_1", "private")],
            vec![InfoItem::new("rule_1", "policy")],
        )
    }

    // ============== PairingResponse Tests ==============

    #[test]
    fn test_uncontacted_response_covers_all_oracles() {
        let response = PairingResponse::uncontacted(["llama", "apertus"], "agent paused");

        assert_eq!(response.per_oracle.len(), 2);
        assert!(response
            .per_oracle
            .values()
            .all(|a| a.decision == Decision::Uncontacted));
        assert!(!response.has_decision());
    }

    #[test]
    fn test_has_decision_with_real_verdict() {
        let mut response = PairingResponse::default();
        response.per_oracle.insert(
            "llama".to_string(),
            OracleAnswer {
                decision: Decision::Refused,
                rationale: "no overlap".to_string(),
            },
        );
        assert!(response.has_decision());
    }

    #[test]
    fn test_rationale_text_names_oracles() {
        let mut response = PairingResponse::default();
        response.per_oracle.insert(
            "llama".to_string(),
            OracleAnswer {
                decision: Decision::Accepted,
                rationale: "rule_1: POSITIVE".to_string(),
            },
        );
        let text = response.rationale_text();
        assert!(text.contains("[llama]"));
        assert!(text.contains("rule_1"));
    }

    // ============== UserInformation Tests ==============

    #[test]
    fn test_info_query_public_only() {
        let profile = sample_profile();
        let info = UserInformation::for_query(InfoQuery::Public, Some(&profile), false);

        assert!(info.public_information.is_some());
        assert!(info.private_information.is_none());
        assert!(info.policies.is_none());
        assert!(info.is_setup);
    }

    #[test]
    fn test_info_query_all() {
        let profile = sample_profile();
        let info = UserInformation::for_query(InfoQuery::All, Some(&profile), true);

        assert!(info.public_information.is_some());
        assert!(info.private_information.is_some());
        assert!(info.policies.is_some());
        assert!(info.paused);
    }

    #[test]
    fn test_info_query_before_setup() {
        let info = UserInformation::for_query(InfoQuery::All, None, false);
        assert!(!info.is_setup);
        assert!(info.public_information.is_none());
    }

    // ============== Serialization Tests ==============

    #[test]
    fn test_action_kind_round_trip() {
        let json = serde_json::to_string(&ActionKind::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
        let back: ActionKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActionKind::Delete);
    }

    #[test]
    fn test_pairing_request_default_feedback() {
        let json = r#"{
            "requester": "alice",
            "requesterInformation": "ETH student",
            "receiver": "bob"
        }"#;
        let request: PairingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.requester.as_str(), "alice");
        assert!(request.feedback.is_empty());
    }
}
