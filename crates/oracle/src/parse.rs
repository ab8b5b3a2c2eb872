//! Parsing of raw oracle output
//!
//! Oracles answer in loosely structured free text. These helpers pull the
//! structured pieces out: the first-line ACCEPT/REJECT decision, per-rule
//! evidence tags, embedded JSON documents, and the three onboarding
//! categories. Anything unreadable is reported as `None` and the caller
//! decides the fail-closed default.

use regex::Regex;
use shared::{Decision, InfoItem, Profile, Usage};
use std::sync::OnceLock;

fn chain_of_thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"))
}

fn evidence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*-?\s*'?([A-Za-z0-9_.\-]+)'?\s*[:\-]\s*'?(POSITIVE|NEGATIVE|PRIVATE|UNUSED)'?")
            .expect("static regex")
    })
}

/// Strips `<think>...</think>` reasoning blocks some models prepend.
pub fn remove_chain_of_thought(text: &str) -> String {
    chain_of_thought_re().replace_all(text, "").trim().to_string()
}

/// Reads the decision from the first non-empty line of an answer.
///
/// REJECT is checked before ACCEPT so an answer containing both (for
/// example "do not ACCEPT, REJECT") cannot be read as an acceptance.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let cleaned = remove_chain_of_thought(text);
    let first_line = cleaned.lines().find(|line| !line.trim().is_empty())?;
    let upper = first_line.to_uppercase();
    if upper.contains("REJECT") {
        Some(Decision::Refused)
    } else if upper.contains("ACCEPT") {
        Some(Decision::Accepted)
    } else {
        None
    }
}

/// The rationale is everything after the decision line.
pub fn parse_rationale(text: &str) -> String {
    let cleaned = remove_chain_of_thought(text);
    cleaned
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .skip(1)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Pulls `rule_id: POSITIVE|NEGATIVE|PRIVATE|UNUSED` evidence pairs out of a
/// rationale, in answer order.
pub fn parse_evidence(text: &str) -> Vec<(String, Usage)> {
    evidence_re()
        .captures_iter(text)
        .map(|caps| {
            let usage = match &caps[2] {
                "POSITIVE" => Usage::Positive,
                "NEGATIVE" => Usage::Negative,
                "PRIVATE" => Usage::Private,
                _ => Usage::Unused,
            };
            (caps[1].to_string(), usage)
        })
        .collect()
}

/// Finds the first balanced JSON object or array in free text and parses it.
///
/// Models wrap their JSON in prose and code fences; this scans for the first
/// opening bracket and matches brackets while honoring string literals and
/// escapes, then hands the slice to serde.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    for (start, &byte) in bytes.iter().enumerate() {
        let close = match byte {
            b'{' => b'}',
            b'[' => b']',
            _ => continue,
        };
        let mut stack = vec![close];
        let mut in_string = false;
        let mut escape_next = false;
        for (offset, &ch) in bytes[start + 1..].iter().enumerate() {
            if in_string {
                if escape_next {
                    escape_next = false;
                } else if ch == b'"' {
                    in_string = false;
                } else if ch == b'\\' {
                    escape_next = true;
                }
                continue;
            }
            match ch {
                b'"' => in_string = true,
                b'{' => stack.push(b'}'),
                b'[' => stack.push(b']'),
                b'}' | b']' => {
                    if stack.last() != Some(&ch) {
                        break;
                    }
                    stack.pop();
                    if stack.is_empty() {
                        let end = start + 1 + offset + 1;
                        match serde_json::from_str(&text[start..end]) {
                            Ok(value) => return Some(value),
                            Err(_) => break,
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Parses an extracted JSON document into a `Profile`.
///
/// Accepts the canonical shape (`publicInformation` / `privateInformation` /
/// `policies`, each a list of `{id, content}`) and tolerates item lists
/// using `info_ID` / `rule_ID` keys, which some models emit.
pub fn profile_from_json(value: &serde_json::Value) -> Option<Profile> {
    let object = value.as_object()?;
    let public_information = items_from_json(object.get("publicInformation")?)?;
    let private_information = items_from_json(
        object
            .get("privateInformation")
            .unwrap_or(&serde_json::Value::Array(vec![])),
    )?;
    let policies = items_from_json(object.get("policies")?)?;
    Some(Profile::new(public_information, private_information, policies))
}

fn items_from_json(value: &serde_json::Value) -> Option<Vec<InfoItem>> {
    let array = value.as_array()?;
    let mut items = Vec::with_capacity(array.len());
    for entry in array {
        let object = entry.as_object()?;
        let id = object
            .get("id")
            .or_else(|| object.get("info_ID"))
            .or_else(|| object.get("rule_ID"))?
            .as_str()?
            .to_string();
        let content = object.get("content")?.as_str()?.to_string();
        items.push(InfoItem { id, content });
    }
    Some(items)
}

/// Splits a categorized onboarding answer into its three sections:
/// `(policies, public information, private information)`.
pub fn separate_categories(text: &str) -> (String, String, String) {
    fn section(text: &str, header: &str, next_headers: &[&str]) -> String {
        let Some(start) = text.find(header) else {
            return String::new();
        };
        let body = &text[start + header.len()..];
        let end = next_headers
            .iter()
            .filter_map(|h| body.find(h))
            .min()
            .unwrap_or(body.len());
        body[..end].trim().trim_start_matches(':').trim().to_string()
    }

    let public = section(
        text,
        "**Public Information**",
        &["**Private Information**", "**Policies**"],
    );
    let private = section(text, "**Private Information**", &["**Policies**"]);
    let policies = section(text, "**Policies**", &[]);
    (policies, public, private)
}
