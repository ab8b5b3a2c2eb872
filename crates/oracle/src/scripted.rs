//! Deterministic oracles for tests and the demo
//!
//! `ScriptedOracle` stands in for a live LLM: it recognizes the prompt
//! families Accord emits (onboarding extraction, pairing evaluation,
//! injection screening, response verification) and answers them with simple
//! keyword logic. `CannedOracle` returns a fixed answer and `SilentOracle`
//! never answers; both exist to exercise the fail-closed paths.

use crate::Oracle;
use async_trait::async_trait;
use shared::Result;
use std::collections::BTreeSet;

/// Marker the agent puts in front of the raw onboarding text.
pub const ONBOARDING_MARKER: &str = "ONBOARDING MESSAGE:";
/// Markers the agent puts around the pairing prompt sections.
pub const RECEIVER_POLICIES_MARKER: &str = "RECEIVER POLICIES:";
pub const RECEIVER_INFORMATION_MARKER: &str = "RECEIVER INFORMATION:";
pub const REQUESTER_INFORMATION_MARKER: &str = "REQUESTER INFORMATION:";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "from", "other", "want", "wants", "connect", "people",
    "person", "who", "are", "was", "this", "his", "her", "they", "them", "have", "has", "not",
    "you", "your", "our", "their",
];

/// Minimum keyword overlap between a requester's information and the
/// receiver's policies/information for the scripted judge to accept.
const ACCEPT_THRESHOLD: usize = 2;

/// A deterministic judgment oracle driven by keyword overlap.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle;

impl ScriptedOracle {
    pub fn new() -> Self {
        Self
    }

    fn answer_extraction(free_text: &str) -> String {
        let mut public = Vec::new();
        let mut private = Vec::new();
        let mut policies = Vec::new();

        for sentence in free_text.split('.') {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let lower = sentence.to_lowercase();
            if lower.contains("private") || lower.contains("keep") && lower.contains("secret") {
                private.push(sentence);
            } else if lower.contains("connect") || lower.contains("only") {
                policies.push(sentence);
            } else {
                public.push(sentence);
            }
        }

        let items = |prefix: &str, entries: &[&str]| -> serde_json::Value {
            entries
                .iter()
                .enumerate()
                .map(|(index, content)| {
                    serde_json::json!({
                        "id": format!("{prefix}_{}", index + 1),
                        "content": content,
                    })
                })
                .collect::<Vec<_>>()
                .into()
        };

        serde_json::json!({
            "publicInformation": items("info", &public),
            "privateInformation": items("priv", &private),
            "policies": items("rule", &policies),
        })
        .to_string()
    }

    fn answer_pairing(prompt: &str) -> String {
        let policies = section_after(prompt, RECEIVER_POLICIES_MARKER);
        let own_information = section_after(prompt, RECEIVER_INFORMATION_MARKER);
        let requester = section_after(prompt, REQUESTER_INFORMATION_MARKER);

        let mut own_keywords = keywords(&policies);
        own_keywords.extend(keywords(&own_information));
        let requester_keywords = keywords(&requester);

        let overlap: Vec<&String> = own_keywords.intersection(&requester_keywords).collect();
        if overlap.len() >= ACCEPT_THRESHOLD {
            format!(
                "ACCEPT\nrule_1: POSITIVE\nshared interests: {}",
                overlap
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        } else {
            "REJECT\nrule_1: NEGATIVE\nno sufficient overlap with the receiver's policies"
                .to_string()
        }
    }

    fn answer_screen(prompt: &str) -> String {
        let input = section_after(prompt, "Input:");
        let lower = input.to_lowercase();
        let suspicious = lower.contains("ignore") && lower.contains("instruction")
            || lower.contains("disregard")
            || lower.contains("system prompt");
        if suspicious { "YES" } else { "NO" }.to_string()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Some(start) = prompt.find(ONBOARDING_MARKER) {
            let free_text = &prompt[start + ONBOARDING_MARKER.len()..];
            return Ok(Self::answer_extraction(free_text));
        }
        if prompt.contains("'YES' or 'NO'") {
            return Ok(Self::answer_screen(prompt));
        }
        if prompt.contains("\"VALID\" or \"INVALID\"") {
            return Ok("VALID".to_string());
        }
        if prompt.contains(REQUESTER_INFORMATION_MARKER) {
            return Ok(Self::answer_pairing(prompt));
        }
        Ok("REJECT\nunrecognized request".to_string())
    }
}

/// Oracle returning the same text for every prompt.
#[derive(Debug, Clone)]
pub struct CannedOracle {
    response: String,
}

impl CannedOracle {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Oracle for CannedOracle {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Oracle that never answers; pairs with `complete_with_timeout` in tests of
/// the timeout fail-closed path.
#[derive(Debug, Clone, Default)]
pub struct SilentOracle;

#[async_trait]
impl Oracle for SilentOracle {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        std::future::pending().await
    }
}

fn section_after(text: &str, marker: &str) -> String {
    let Some(start) = text.find(marker) else {
        return String::new();
    };
    let body = &text[start + marker.len()..];
    // A section ends at the next ALL-CAPS marker line or at the end of text.
    let end = [
        RECEIVER_POLICIES_MARKER,
        RECEIVER_INFORMATION_MARKER,
        REQUESTER_INFORMATION_MARKER,
    ]
    .iter()
    .filter_map(|m| body.find(m))
    .min()
    .unwrap_or(body.len());
    body[..end].trim().to_string()
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|word| word.to_lowercase())
        .map(|word| word.strip_suffix('s').map(str::to_string).unwrap_or(word))
        .filter(|word| word.len() >= 3 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}
