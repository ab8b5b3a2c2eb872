//! Agent identity and profile types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a user and their personal agent.
///
/// No two concurrently registered agents share an id; uniqueness is enforced
/// by the orchestrator at registration time, not here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One item of profile content (an information entry or a pairing rule).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoItem {
    pub id: String,
    pub content: String,
}

impl InfoItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// The complete profile held by one personal agent.
///
/// `public_information` is shareable with peers; `private_information` never
/// leaves the owning agent; `policies` are consulted only by the owning
/// agent's oracles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub public_information: Vec<InfoItem>,
    #[serde(default)]
    pub private_information: Vec<InfoItem>,
    #[serde(default)]
    pub policies: Vec<InfoItem>,
}

impl Profile {
    pub fn new(
        public_information: Vec<InfoItem>,
        private_information: Vec<InfoItem>,
        policies: Vec<InfoItem>,
    ) -> Self {
        Self {
            public_information,
            private_information,
            policies,
        }
    }

    /// Flattened public information, as shared with peers.
    pub fn public_text(&self) -> String {
        join_items(&self.public_information)
    }

    /// Flattened private information, for prompt assembly only.
    pub fn private_text(&self) -> String {
        join_items(&self.private_information)
    }

    /// Flattened pairing policies, for prompt assembly only.
    pub fn policies_text(&self) -> String {
        join_items(&self.policies)
    }
}

/// The subset of a profile the orchestrator keeps as its negotiation
/// snapshot: public information (forwarded to counterparts) and policies
/// (consulted by the response verifier). Private information stays with the
/// owning agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    #[serde(default)]
    pub public_information: Vec<InfoItem>,
    #[serde(default)]
    pub policies: Vec<InfoItem>,
}

impl AgentSnapshot {
    pub fn public_text(&self) -> String {
        join_items(&self.public_information)
    }

    pub fn policies_text(&self) -> String {
        join_items(&self.policies)
    }
}

impl From<&Profile> for AgentSnapshot {
    fn from(profile: &Profile) -> Self {
        Self {
            public_information: profile.public_information.clone(),
            policies: profile.policies.clone(),
        }
    }
}

fn join_items(items: &[InfoItem]) -> String {
    items
        .iter()
        .map(|item| item.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
