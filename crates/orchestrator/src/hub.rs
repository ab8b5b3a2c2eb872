//! Orchestrator - ledger ownership, matching, lifecycle, feedback, queries

use agent::AgentHandle;
use async_trait::async_trait;
use events::{EventKind, EventLog, EventRecord, EventStats};
use ledger::{LedgerEntry, PairKey, RecordedVerdict, RegistrationState, RelationLedger};
use oracle::{parse_evidence, InjectionScreen, OracleRef, ResponseVerifier, Verification};
use serde::Serialize;
use shared::{
    AccordConfig, AccordError, ActionKind, AgentId, ConfigurationMessage, Decision, Feedback,
    FeedbackMessage, OrchestratorLink, PairingRequest, PairingResponse, RelationQuery, Result,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};

/// Result of a relation query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum RelationReport {
    Entries(Vec<(PairKey, LedgerEntry)>),
    Agents(Vec<AgentId>),
}

/// Everything guarded by the single mutation mutex.
struct State {
    ledger: RelationLedger,
    handles: BTreeMap<AgentId, AgentHandle>,
    /// Directions currently being negotiated; a second fan-out touching the
    /// same direction skips it instead of racing the write.
    in_flight: BTreeSet<PairKey>,
    /// Per-agent registration generation: bumped on every successful
    /// registration, never reused, kept across deletion. A direction round
    /// captures the generations it was planned under; a commit whose
    /// generations no longer match was superseded by a re-registration and
    /// must not land in the new entry.
    generations: BTreeMap<AgentId, u64>,
}

impl State {
    fn generation(&self, id: &AgentId) -> u64 {
        self.generations.get(id).copied().unwrap_or(0)
    }
}

/// The central coordinator. Constructed explicitly and shared as an `Arc`;
/// there is no global instance.
pub struct Orchestrator {
    state: Mutex<State>,
    events: Mutex<EventLog>,
    config: AccordConfig,
    /// Backend for the orchestrator's own oracle calls (injection screen,
    /// response verifier).
    oracle: OracleRef,
    fanout_permits: Arc<Semaphore>,
    oracle_timeout: Duration,
    active_matches: AtomicUsize,
    idle: Notify,
}

/// What one direction task needs once the skip checks under the mutex have
/// passed.
struct DirectionPlan {
    key: PairKey,
    /// Agent whose oracles decide; the entry lands under (decider, requester).
    decider: AgentId,
    requester: AgentId,
    handle: AgentHandle,
    requester_information: String,
    receiver_policies: String,
    /// Registration generations of (decider, requester) at plan time.
    generations: (u64, u64),
}

/// Verdicts a direction task produced, with the provenance the event log
/// wants: whether they came from the receiver's oracles or a fail-closed
/// path.
struct DirectionOutcome {
    verdicts: Vec<(String, RecordedVerdict)>,
    fail_closed: bool,
}

impl Orchestrator {
    pub fn new(config: AccordConfig, oracle: OracleRef) -> Arc<Self> {
        let fanout_permits = Arc::new(Semaphore::new(config.match_concurrency));
        let oracle_timeout = Duration::from_secs(config.oracle_timeout_secs);
        Arc::new(Self {
            state: Mutex::new(State {
                ledger: RelationLedger::new(),
                handles: BTreeMap::new(),
                in_flight: BTreeSet::new(),
                generations: BTreeMap::new(),
            }),
            events: Mutex::new(EventLog::default()),
            config,
            oracle,
            fanout_permits,
            oracle_timeout,
            active_matches: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    /// The link handed to personal agents at spawn time.
    pub fn link(self: &Arc<Self>) -> Arc<dyn OrchestratorLink> {
        Arc::new(HubLink(self.clone()))
    }

    /// Installs the mailbox handle for an agent, replacing any previous one.
    pub async fn attach_handle(&self, id: AgentId, handle: AgentHandle) {
        self.state.lock().await.handles.insert(id, handle);
    }

    /// Drops every agent handle; running agents end once the boundary drops
    /// its clones too.
    pub async fn detach_all(&self) {
        self.state.lock().await.handles.clear();
    }

    /// Blocks until no matching fan-out is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active_matches.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    // ---- Registration and matching -------------------------------------

    /// Installs the agent's snapshot in the ledger and returns the agents it
    /// should be matched against. The snapshot of the registered set is taken
    /// under the same lock that installs the newcomer, so a concurrent
    /// registration ends up in exactly one of the two fan-outs.
    ///
    /// Registration requires an attached mailbox handle: after a `Delete`
    /// (which detaches the handle), re-onboarding goes through a fresh
    /// `Runtime::spawn_agent`, not the old mailbox.
    async fn register(&self, message: ConfigurationMessage) -> Result<Vec<AgentId>> {
        let user = message.user.clone();
        let counterparts = {
            let mut state = self.state.lock().await;
            if !state.handles.contains_key(&user) {
                return Err(AccordError::Transport(format!(
                    "no mailbox handle attached for {user}"
                )));
            }
            let counterparts = state.ledger.register_agent(message.user, message.snapshot)?;
            *state.generations.entry(user.clone()).or_default() += 1;
            counterparts
        };
        tracing::info!(agent = %user, counterparts = counterparts.len(), "agent registered");
        self.record_event(EventKind::AgentRegistered, Some(user), None).await;
        Ok(counterparts)
    }

    /// Starts the matching fan-out for a newly registered agent as a
    /// background task. Registration must not wait for matching: the agent
    /// calling `configure` is itself a mailbox actor and has to be free to
    /// answer the pairing requests the fan-out sends it.
    fn spawn_match(self: &Arc<Self>, id: AgentId, counterparts: Vec<AgentId>) {
        if counterparts.is_empty() {
            return;
        }
        self.active_matches.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            this.match_agent(&id, &counterparts).await;
            if this.active_matches.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.idle.notify_waiters();
            }
        });
    }

    /// Negotiates both directions against every counterpart, concurrently,
    /// bounded by the semaphore.
    async fn match_agent(self: &Arc<Self>, id: &AgentId, counterparts: &[AgentId]) {
        self.record_event(EventKind::MatchStarted, Some(id.clone()), None)
            .await;
        let mut directions = tokio::task::JoinSet::new();
        for other in counterparts {
            for (decider, requester) in [
                (id.clone(), other.clone()),
                (other.clone(), id.clone()),
            ] {
                let this = self.clone();
                directions.spawn(async move {
                    this.negotiate_direction(decider, requester).await;
                });
            }
        }
        while directions.join_next().await.is_some() {}
    }

    /// Runs one direction as its own counted task, so `wait_until_idle`
    /// covers renegotiations scheduled after a superseded round.
    fn spawn_direction(self: &Arc<Self>, decider: AgentId, requester: AgentId) {
        self.active_matches.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            this.negotiate_direction(decider, requester).await;
            if this.active_matches.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.idle.notify_waiters();
            }
        });
    }

    async fn negotiate_direction(self: &Arc<Self>, decider: AgentId, requester: AgentId) {
        let permit = match self.fanout_permits.acquire().await {
            Ok(permit) => permit,
            // Closed semaphore means shutdown; nothing to record.
            Err(_) => return,
        };

        let Some(plan) = self.prepare_direction(&decider, &requester).await else {
            drop(permit);
            return;
        };

        let outcome = self.run_direction(&plan).await;
        drop(permit);
        self.commit_direction(plan, outcome).await;
    }

    /// Skip checks and in-flight marking, all under the mutation mutex.
    async fn prepare_direction(
        &self,
        decider: &AgentId,
        requester: &AgentId,
    ) -> Option<DirectionPlan> {
        let mut state = self.state.lock().await;
        let key = PairKey::new(decider.clone(), requester.clone()).ok()?;
        if state.in_flight.contains(&key) {
            return None;
        }
        if state.ledger.state_of(decider) != RegistrationState::Registered
            || state.ledger.state_of(requester) != RegistrationState::Registered
        {
            return None;
        }
        if let Some(entry) = state.ledger.entry(decider, requester) {
            let negotiated = self
                .config
                .primary_oracles
                .iter()
                .any(|name| entry.verdicts.contains_key(name));
            if negotiated {
                return None;
            }
        }
        let handle = state.handles.get(decider)?.clone();
        let requester_information = state.ledger.snapshot(requester)?.public_text();
        let receiver_policies = state
            .ledger
            .snapshot(decider)
            .map(|snapshot| snapshot.policies_text())
            .unwrap_or_default();

        let generations = (state.generation(decider), state.generation(requester));

        state.in_flight.insert(key.clone());
        Some(DirectionPlan {
            key,
            decider: decider.clone(),
            requester: requester.clone(),
            handle,
            requester_information,
            receiver_policies,
            generations,
        })
    }

    /// The oracle-facing part of one direction, run without holding the
    /// mutex. Always produces verdicts or an empty vector (receiver declined
    /// to answer, direction stays pending); a transport failure or timeout
    /// produces fail-closed refusals, never a silent drop.
    async fn run_direction(&self, plan: &DirectionPlan) -> DirectionOutcome {
        if self.config.injection_screen {
            let screen = InjectionScreen::new(self.oracle.clone(), self.oracle_timeout);
            if screen.detect(&plan.requester_information).await {
                tracing::warn!(pair = %plan.key, "requester information failed the injection screen");
                self.record_event(
                    EventKind::InjectionSuspected,
                    Some(plan.requester.clone()),
                    Some(plan.key.to_string()),
                )
                .await;
                return self.refuse_all("requester information failed the injection screen");
            }
        }

        let mut response = match self.send_request(plan, "").await {
            Some(response) => response,
            None => return self.refuse_all("receiver unreachable or timed out"),
        };

        if self.config.verify_responses && response.has_decision() {
            let verifier = ResponseVerifier::new(self.oracle.clone(), self.oracle_timeout);
            let mut rounds = 0;
            while rounds < self.config.max_verifier_rounds {
                let outcome = verifier
                    .verify(
                        &plan.requester_information,
                        &plan.receiver_policies,
                        &response.rationale_text(),
                    )
                    .await;
                let Verification::Invalid(feedback) = outcome else {
                    break;
                };
                rounds += 1;
                tracing::debug!(pair = %plan.key, rounds, "verifier rejected the rationale, retrying");
                response = match self.send_request(plan, &feedback).await {
                    Some(response) => response,
                    None => return self.refuse_all("receiver unreachable or timed out"),
                };
                if !response.has_decision() {
                    break;
                }
            }
        }

        let verdicts = response
            .per_oracle
            .into_iter()
            .filter(|(_, answer)| answer.decision != Decision::Uncontacted)
            .map(|(name, answer)| {
                let evidence = parse_evidence(&answer.rationale);
                (
                    name,
                    RecordedVerdict::now(answer.decision, answer.rationale, evidence),
                )
            })
            .collect();
        DirectionOutcome {
            verdicts,
            fail_closed: false,
        }
    }

    async fn send_request(&self, plan: &DirectionPlan, feedback: &str) -> Option<PairingResponse> {
        let request = PairingRequest {
            requester: plan.requester.clone(),
            requester_information: plan.requester_information.clone(),
            receiver: plan.decider.clone(),
            feedback: feedback.to_string(),
        };
        // The receiver evaluates its oracles sequentially and may have other
        // mail queued, so the round-trip deadline is a multiple of the
        // per-call timeout.
        let deadline = self.oracle_timeout * 4;
        match tokio::time::timeout(deadline, plan.handle.evaluate_pairing(request)).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(error)) => {
                tracing::warn!(pair = %plan.key, %error, "pairing round trip failed");
                None
            }
            Err(_) => {
                tracing::warn!(pair = %plan.key, "pairing round trip timed out");
                None
            }
        }
    }

    /// Fail-closed outcome: a refusal under every primary oracle name, so
    /// the direction counts as negotiated and is never retried silently.
    fn refuse_all(&self, reason: &str) -> DirectionOutcome {
        let verdicts = self
            .config
            .primary_oracles
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    RecordedVerdict::now(Decision::Refused, reason.to_string(), vec![]),
                )
            })
            .collect();
        DirectionOutcome {
            verdicts,
            fail_closed: true,
        }
    }

    /// Writes the verdicts and clears the in-flight mark. An agent deleted
    /// while the direction was in flight must not be resurrected, so the
    /// write is skipped when either side has left the ledger. A round whose
    /// agents re-registered mid-flight judged a snapshot that no longer
    /// exists: its outcome is dropped and the direction is negotiated again
    /// against the current profiles.
    async fn commit_direction(self: &Arc<Self>, plan: DirectionPlan, outcome: DirectionOutcome) {
        let (recorded, superseded) = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(&plan.key);
            if state.ledger.state_of(&plan.decider) == RegistrationState::Unregistered
                || state.ledger.state_of(&plan.requester) == RegistrationState::Unregistered
            {
                (false, false)
            } else if (state.generation(&plan.decider), state.generation(&plan.requester))
                != plan.generations
            {
                tracing::debug!(pair = %plan.key, "round superseded by a re-registration, renegotiating");
                (false, true)
            } else {
                for (name, verdict) in &outcome.verdicts {
                    if let Err(error) =
                        state
                            .ledger
                            .record_verdict(&plan.decider, &plan.requester, name, verdict.clone())
                    {
                        tracing::error!(pair = %plan.key, %error, "verdict write failed");
                    }
                }
                (!outcome.verdicts.is_empty(), false)
            }
        };
        if superseded {
            self.spawn_direction(plan.decider, plan.requester);
            return;
        }
        if recorded {
            let kind = if outcome.fail_closed {
                EventKind::VerdictRefusedFailClosed
            } else {
                EventKind::VerdictRecorded
            };
            self.record_event(kind, Some(plan.decider), Some(plan.key.to_string()))
                .await;
        }
    }

    // ---- Lifecycle, feedback, queries ----------------------------------

    /// Mirrors a lifecycle transition into the ledger.
    pub async fn apply_action(&self, kind: ActionKind, user: &AgentId) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match kind {
                ActionKind::Pause => state.ledger.pause(user)?,
                ActionKind::Resume => state.ledger.resume(user)?,
                ActionKind::Delete => {
                    state.ledger.delete_or_reset(user);
                    state.handles.remove(user);
                }
                ActionKind::Reset => state.ledger.delete_or_reset(user),
            }
        }
        let event = match kind {
            ActionKind::Pause => EventKind::AgentPaused,
            ActionKind::Resume => EventKind::AgentResumed,
            ActionKind::Delete => EventKind::AgentDeleted,
            ActionKind::Reset => EventKind::AgentReset,
        };
        self.record_event(event, Some(user.clone()), None).await;
        Ok(())
    }

    /// Replaces a registered agent's public snapshot without touching its
    /// negotiated entries. Verdicts recorded against the old snapshot stand;
    /// a reset is the path that renegotiates them.
    pub async fn update_profile(&self, message: ConfigurationMessage) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.ledger.update_snapshot(&message.user, message.snapshot)?;
        }
        self.record_event(EventKind::ProfileUpdated, Some(message.user), None)
            .await;
        Ok(())
    }

    /// Records a user's confirmation or rejection of a negotiated pairing.
    pub async fn submit_feedback(&self, message: FeedbackMessage) -> Result<()> {
        let feedback = Feedback::from_accepted(message.accepted);
        {
            let mut state = self.state.lock().await;
            state
                .ledger
                .record_feedback(&message.sender, &message.receiver, feedback)?;
        }
        self.record_event(
            EventKind::FeedbackRecorded,
            Some(message.sender.clone()),
            Some(format!("{} -> {}: {feedback}", message.sender, message.receiver)),
        )
        .await;
        Ok(())
    }

    /// Pure read projections over the ledger.
    pub async fn query(&self, query: RelationQuery) -> RelationReport {
        let state = self.state.lock().await;
        match query {
            RelationQuery::AllForUser(id) => {
                RelationReport::Entries(state.ledger.entries_for_agent(&id))
            }
            RelationQuery::FullLedger => RelationReport::Entries(state.ledger.full()),
            RelationQuery::RegisteredAgents => {
                RelationReport::Agents(state.ledger.all_registered())
            }
            RelationQuery::PendingHumanApproval(id) => {
                RelationReport::Agents(state.ledger.pending_human_approval(&id))
            }
            RelationQuery::Established(id) => {
                RelationReport::Agents(state.ledger.established_relations(&id))
            }
            RelationQuery::SentUnanswered(id) => {
                RelationReport::Agents(state.ledger.one_sidedly_sent_pairs(&id))
            }
        }
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.events
            .lock()
            .await
            .get_recent(limit)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn event_stats(&self) -> EventStats {
        self.events.lock().await.get_stats()
    }

    async fn record_event(&self, kind: EventKind, agent: Option<AgentId>, detail: Option<String>) {
        self.events.lock().await.record(kind, agent, detail, None);
    }
}

/// The `OrchestratorLink` handed to agents: registration triggers the
/// matching fan-out, lifecycle actions pass straight through.
struct HubLink(Arc<Orchestrator>);

#[async_trait]
impl OrchestratorLink for HubLink {
    async fn configure(&self, message: ConfigurationMessage) -> Result<()> {
        let user = message.user.clone();
        let counterparts = self.0.register(message).await?;
        self.0.spawn_match(user, counterparts);
        Ok(())
    }

    async fn apply_action(&self, kind: ActionKind, user: &AgentId) -> Result<()> {
        self.0.apply_action(kind, user).await
    }

    async fn update_profile(&self, message: ConfigurationMessage) -> Result<()> {
        self.0.update_profile(message).await
    }
}

impl Orchestrator {
    /// Diagnostic accessor: the registration state of an agent.
    pub async fn registration_state(&self, id: &AgentId) -> RegistrationState {
        self.state.lock().await.ledger.state_of(id)
    }
}
