//! PersonalAgent - per-user state machine

use crate::prompt;
use oracle::{
    complete_with_timeout, extract_json, parse_decision, parse_rationale, profile_from_json,
    remove_chain_of_thought, separate_categories, OracleRef, OracleSet, Sanitizer,
};
use shared::{
    ActionKind, AgentId, AgentSnapshot, ConfigurationMessage, Decision, InfoItem, InfoQuery,
    OracleAnswer, OrchestratorLink, PairingRequest, PairingResponse, Profile, Result,
    SetupRequest, Status, UserInformation,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One user's personal agent.
///
/// All methods take `&mut self` or `&self` without internal locking; the
/// mailbox task in [`crate::mailbox`] is the single owner and processes one
/// message at a time.
pub struct PersonalAgent {
    id: AgentId,
    profile: Option<Profile>,
    paused: bool,
    oracles: OracleSet,
    /// Oracle used for profile extraction; usually one of the judgment
    /// oracles, but kept separate so a cheaper backend can do setup.
    extractor: OracleRef,
    sanitizer: Box<dyn Sanitizer>,
    link: Arc<dyn OrchestratorLink>,
    max_extract_attempts: u32,
    oracle_timeout: Duration,
}

impl PersonalAgent {
    pub fn new(
        id: AgentId,
        oracles: OracleSet,
        extractor: OracleRef,
        sanitizer: Box<dyn Sanitizer>,
        link: Arc<dyn OrchestratorLink>,
        max_extract_attempts: u32,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            id,
            profile: None,
            paused: false,
            oracles,
            extractor,
            sanitizer,
            link,
            max_extract_attempts,
            oracle_timeout,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Extracts a structured profile from the user's free-text onboarding
    /// message and registers with the orchestrator.
    ///
    /// A second setup of an already-configured agent is `Repeated` and
    /// mutates nothing. Extraction gets a bounded attempt budget; exhausting
    /// it is a terminal `Failed`, leaving the agent eligible for another
    /// setup call.
    pub async fn setup(&mut self, request: SetupRequest) -> Status {
        if self.profile.is_some() {
            return Status::Repeated;
        }

        let prompt = prompt::extraction_prompt(&request.content, request.default_policy_hint);
        for attempt in 1..=self.max_extract_attempts {
            let answer = match complete_with_timeout(
                self.extractor.as_ref(),
                "extraction",
                &prompt,
                self.oracle_timeout,
            )
            .await
            {
                Ok(answer) => answer,
                Err(error) => {
                    tracing::warn!(agent = %self.id, attempt, %error, "extraction oracle failed");
                    continue;
                }
            };

            let cleaned = remove_chain_of_thought(&answer);
            let Some(profile) = extract_json(&cleaned)
                .as_ref()
                .and_then(profile_from_json)
                .or_else(|| profile_from_sections(&cleaned))
            else {
                tracing::warn!(agent = %self.id, attempt, "extraction answer was not parseable");
                continue;
            };

            let message = ConfigurationMessage {
                user: self.id.clone(),
                snapshot: AgentSnapshot::from(&profile),
            };
            if let Err(error) = self.link.configure(message).await {
                tracing::error!(agent = %self.id, %error, "registration failed after extraction");
                return Status::Failed;
            }

            tracing::info!(agent = %self.id, attempt, "agent set up and registered");
            self.profile = Some(profile);
            return Status::Completed;
        }

        tracing::warn!(
            agent = %self.id,
            attempts = self.max_extract_attempts,
            "profile extraction exhausted its attempt budget"
        );
        Status::Failed
    }

    /// Evaluates an incoming pairing request with every active oracle.
    ///
    /// Fail-closed: an agent that is not set up, is paused, or received a
    /// request addressed to someone else answers `Uncontacted` for every
    /// active oracle and never leaks why beyond a generic rationale.
    pub async fn evaluate_pairing(&self, request: PairingRequest) -> PairingResponse {
        let names = self.oracles.active_names();
        let uncontacted =
            |reason: &str| PairingResponse::uncontacted(names.iter().map(String::as_str), reason);

        if request.receiver != self.id {
            tracing::warn!(agent = %self.id, addressed_to = %request.receiver, "mis-routed pairing request");
            return uncontacted("request not addressed to this agent");
        }
        if self.paused {
            return uncontacted("agent is paused");
        }
        let Some(profile) = &self.profile else {
            return uncontacted("agent is not set up");
        };

        let wrapped = self.sanitizer.wrap(&request.requester_information);
        let prompt = prompt::pairing_prompt(profile, &wrapped, &request.feedback);

        let mut response = PairingResponse::default();
        for (name, oracle) in self.oracles.active() {
            let answer = match complete_with_timeout(
                oracle.as_ref(),
                &name,
                &prompt,
                self.oracle_timeout,
            )
            .await
            {
                Ok(answer) => remove_chain_of_thought(&answer),
                Err(error) => {
                    tracing::warn!(agent = %self.id, oracle = %name, %error, "oracle failed, refusing");
                    response.per_oracle.insert(
                        name,
                        OracleAnswer {
                            decision: Decision::Refused,
                            rationale: format!("oracle unavailable: {error}"),
                        },
                    );
                    continue;
                }
            };

            // An answer that parses to neither verdict is a refusal.
            let decision = parse_decision(&answer).unwrap_or(Decision::Refused);
            let rationale = parse_rationale(&answer);
            response
                .per_oracle
                .insert(name, OracleAnswer { decision, rationale });
        }
        response
    }

    /// Wholesale profile overwrite. With `reset_connections`, every ledger
    /// entry touching this agent is purged and the agent re-registers with
    /// the new snapshot, so no verdict based on the old profile lingers.
    /// Without it, the fresh snapshot is still pushed to the orchestrator so
    /// later registrants negotiate against current information; existing
    /// verdicts stand.
    pub async fn change_information(
        &mut self,
        profile: Profile,
        reset_connections: bool,
    ) -> Result<()> {
        let message = ConfigurationMessage {
            user: self.id.clone(),
            snapshot: AgentSnapshot::from(&profile),
        };
        if reset_connections {
            self.link.apply_action(ActionKind::Reset, &self.id).await?;
            self.link.configure(message).await?;
        } else {
            self.link.update_profile(message).await?;
        }
        self.profile = Some(profile);
        Ok(())
    }

    /// Applies a lifecycle action, mirroring it to the orchestrator first so
    /// a ledger rejection leaves the local state untouched.
    pub async fn apply_action(&mut self, kind: ActionKind) -> Result<()> {
        self.link.apply_action(kind, &self.id).await?;
        match kind {
            ActionKind::Pause => self.paused = true,
            ActionKind::Resume => self.paused = false,
            ActionKind::Delete | ActionKind::Reset => {
                self.profile = None;
                self.paused = false;
            }
        }
        Ok(())
    }

    /// Read-only view of the user's information, filtered by query kind.
    pub fn get_info(&self, kind: InfoQuery) -> UserInformation {
        UserInformation::for_query(kind, self.profile.as_ref(), self.paused)
    }

    /// Toggles which named oracles evaluate future pairings. At least one
    /// must remain active; unknown names reject the whole update.
    pub fn update_oracles(
        &mut self,
        updates: &BTreeMap<String, bool>,
    ) -> Result<BTreeMap<String, bool>> {
        self.oracles.set_active(updates)?;
        Ok(self.oracles.statuses())
    }
}

/// Fallback for extraction answers using `**Public Information**` /
/// `**Private Information**` / `**Policies**` section headers instead of the
/// requested JSON shape. One item per non-empty line, list markers stripped.
fn profile_from_sections(answer: &str) -> Option<Profile> {
    let (policies, public, private) = separate_categories(answer);
    if public.is_empty() || policies.is_empty() {
        return None;
    }
    let items = |prefix: &str, text: &str| -> Vec<InfoItem> {
        text.lines()
            .map(|line| line.trim().trim_start_matches('-').trim())
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(index, content)| InfoItem::new(format!("{prefix}_{}", index + 1), content))
            .collect()
    };
    Some(Profile::new(
        items("info", &public),
        items("priv", &private),
        items("rule", &policies),
    ))
}
