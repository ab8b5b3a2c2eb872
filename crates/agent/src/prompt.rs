//! Prompt assembly for the agent's oracle calls
//!
//! The pairing prompt has exactly one point where untrusted counterpart
//! text enters: the requester-information section, wrapped by the configured
//! sanitizer before it gets here.

use oracle::{
    ONBOARDING_MARKER, RECEIVER_INFORMATION_MARKER, RECEIVER_POLICIES_MARKER,
    REQUESTER_INFORMATION_MARKER,
};
use shared::Profile;

/// Prompt asking the extraction oracle to structure a user's free-text
/// onboarding message into the three profile categories.
pub fn extraction_prompt(free_text: &str, default_policy_hint: u32) -> String {
    format!(
        "You organize a user's self-description into a structured profile. \
         Split the message into three categories: information the user shares \
         publicly, information the user wants kept private, and policies \
         describing who the user wants to connect with. Respond with ONLY a \
         JSON object of the shape {{\"publicInformation\": [{{\"id\": \
         \"info_1\", \"content\": \"...\"}}], \"privateInformation\": \
         [{{\"id\": \"priv_1\", \"content\": \"...\"}}], \"policies\": \
         [{{\"id\": \"rule_1\", \"content\": \"...\"}}]}}. When the message \
         leaves a case undecided, default to permissiveness level \
         {default_policy_hint} (0 = share nothing extra, higher = more open).\n\
         {ONBOARDING_MARKER} {free_text}"
    )
}

/// Prompt asking one judgment oracle to accept or refuse a pairing request.
///
/// `requester_information` must already be sanitizer-wrapped. `feedback` is
/// verifier feedback from a previous round; empty on first contact.
pub fn pairing_prompt(profile: &Profile, requester_information: &str, feedback: &str) -> String {
    let mut prompt = format!(
        "You decide on behalf of your user whether to accept a connection \
         request. Apply the user's policies to the requester's public \
         information; consult the user's own information for context. Answer \
         in the first line with ONLY ACCEPT or REJECT, then explain your \
         reasoning, tagging each policy as rule_id: POSITIVE, NEGATIVE, \
         PRIVATE or UNUSED.\n\
         {RECEIVER_POLICIES_MARKER}\n{policies}\n\
         {RECEIVER_INFORMATION_MARKER}\n{public} {private}\n\
         {REQUESTER_INFORMATION_MARKER}\n{requester_information}",
        policies = profile.policies_text(),
        public = profile.public_text(),
        private = profile.private_text(),
    );
    if !feedback.is_empty() {
        prompt.push_str(&format!(
            "\n\nA verifier rejected your previous reasoning with this \
             feedback; re-evaluate taking it into account:\n{feedback}"
        ));
    }
    prompt
}
