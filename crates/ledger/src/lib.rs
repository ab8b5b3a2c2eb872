//! # Accord Ledger
//!
//! The authoritative in-memory store of every per-pair, per-oracle decision
//! and every piece of human feedback, together with the registered/paused
//! agent sets and the public snapshots used as negotiation input.
//!
//! The ledger itself does no locking: the orchestrator serializes every
//! mutation behind a single mutex so that registration snapshots, verdict
//! recording, and lifecycle purges are linearized.

pub mod entry;
pub mod pair;

pub use entry::{LedgerEntry, RecordedVerdict};
pub use pair::PairKey;

use shared::{AccordError, AgentId, AgentSnapshot, Feedback, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Registration state of an agent, as derived from set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
    Paused,
}

/// Concurrency-unaware store of all pairing state.
#[derive(Debug, Default)]
pub struct RelationLedger {
    registered: BTreeSet<AgentId>,
    paused: BTreeSet<AgentId>,
    snapshots: BTreeMap<AgentId, AgentSnapshot>,
    entries: BTreeMap<PairKey, LedgerEntry>,
}

impl RelationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current registration state of an agent.
    pub fn state_of(&self, id: &AgentId) -> RegistrationState {
        if self.registered.contains(id) {
            RegistrationState::Registered
        } else if self.paused.contains(id) {
            RegistrationState::Paused
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Admits a new agent to the registered set.
    ///
    /// Creates placeholder entries in both directions against every agent
    /// already registered, and returns that counterpart snapshot. The caller
    /// holds the orchestrator's mutex across this call, so the returned
    /// snapshot is exactly the set a concurrent registration cannot race
    /// with: a second newcomer will see this agent already installed.
    pub fn register_agent(
        &mut self,
        id: AgentId,
        snapshot: AgentSnapshot,
    ) -> Result<Vec<AgentId>> {
        if self.state_of(&id) != RegistrationState::Unregistered {
            return Err(AccordError::AlreadyRegistered(id));
        }

        let counterparts: Vec<AgentId> = self.registered.iter().cloned().collect();
        for other in &counterparts {
            for key in [PairKey::new(id.clone(), other.clone())?,
                        PairKey::new(other.clone(), id.clone())?]
            {
                self.entries.entry(key).or_default();
            }
        }

        self.registered.insert(id.clone());
        self.snapshots.insert(id, snapshot);
        Ok(counterparts)
    }

    /// The public snapshot stored for an agent, if any.
    pub fn snapshot(&self, id: &AgentId) -> Option<&AgentSnapshot> {
        self.snapshots.get(id)
    }

    /// Replaces the stored snapshot of a known agent. Entries are untouched:
    /// verdicts negotiated against the old snapshot stand, while agents
    /// registering later see the fresh one. Renegotiation is the reset path.
    pub fn update_snapshot(&mut self, id: &AgentId, snapshot: AgentSnapshot) -> Result<()> {
        if self.state_of(id) == RegistrationState::Unregistered {
            return Err(AccordError::UnknownAgent(id.clone()));
        }
        self.snapshots.insert(id.clone(), snapshot);
        Ok(())
    }

    /// Upserts one oracle's verdict for a direction. Creates the entry if it
    /// is missing (defensive: a verdict may arrive for a pair whose
    /// placeholder was never installed). Last writer wins per oracle name.
    pub fn record_verdict(
        &mut self,
        sender: &AgentId,
        receiver: &AgentId,
        oracle_name: &str,
        verdict: RecordedVerdict,
    ) -> Result<()> {
        let key = PairKey::new(sender.clone(), receiver.clone())?;
        let entry = self.entries.entry(key).or_default();
        entry.verdicts.insert(oracle_name.to_string(), verdict);
        Ok(())
    }

    /// Overwrites the human feedback on a direction, preserving the oracle
    /// verdicts. Fails on a pair that was never negotiated and on the
    /// non-committal feedback value.
    pub fn record_feedback(
        &mut self,
        sender: &AgentId,
        receiver: &AgentId,
        feedback: Feedback,
    ) -> Result<()> {
        if feedback == Feedback::Uncontacted {
            return Err(AccordError::InvalidFeedback);
        }
        let key = PairKey::new(sender.clone(), receiver.clone())?;
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| AccordError::UnknownPair {
                sender: sender.clone(),
                receiver: receiver.clone(),
            })?;
        entry.feedback = feedback;
        Ok(())
    }

    /// Moves an agent to the paused set. Retrying an already-paused agent is
    /// a no-op, not an error.
    pub fn pause(&mut self, id: &AgentId) -> Result<()> {
        match self.state_of(id) {
            RegistrationState::Registered => {
                self.registered.remove(id);
                self.paused.insert(id.clone());
                Ok(())
            }
            RegistrationState::Paused => Ok(()),
            RegistrationState::Unregistered => Err(AccordError::UnknownAgent(id.clone())),
        }
    }

    /// Moves an agent back to the registered set. Idempotent like `pause`.
    pub fn resume(&mut self, id: &AgentId) -> Result<()> {
        match self.state_of(id) {
            RegistrationState::Paused => {
                self.paused.remove(id);
                self.registered.insert(id.clone());
                Ok(())
            }
            RegistrationState::Registered => Ok(()),
            RegistrationState::Unregistered => Err(AccordError::UnknownAgent(id.clone())),
        }
    }

    /// Removes an agent and every trace of it: set membership, snapshot,
    /// and every entry where it appears on either side, in either
    /// direction. This is the one compensating operation that violates
    /// append-only; callers run it under the same mutex as registration so
    /// a concurrent fan-out cannot resurrect half-deleted pairs.
    pub fn delete_or_reset(&mut self, id: &AgentId) {
        self.registered.remove(id);
        self.paused.remove(id);
        self.snapshots.remove(id);
        self.entries
            .retain(|key, _| key.sender() != id && key.receiver() != id);
    }

    // ---- Read projections ----------------------------------------------

    /// Every currently registered (not paused) agent.
    pub fn all_registered(&self) -> Vec<AgentId> {
        self.registered.iter().cloned().collect()
    }

    /// The complete ledger contents.
    pub fn full(&self) -> Vec<(PairKey, LedgerEntry)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Every entry touching the given agent, both directions. Entries
    /// involving paused agents stay visible: pausing blocks new
    /// negotiation, not reads.
    pub fn entries_for_agent(&self, id: &AgentId) -> Vec<(PairKey, LedgerEntry)> {
        self.entries
            .iter()
            .filter(|(key, _)| key.sender() == id || key.receiver() == id)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// The entry for one direction, if it exists.
    pub fn entry(&self, sender: &AgentId, receiver: &AgentId) -> Option<&LedgerEntry> {
        let key = PairKey::new(sender.clone(), receiver.clone()).ok()?;
        self.entries.get(&key)
    }

    fn counterparts_of(&self, id: &AgentId) -> BTreeSet<AgentId> {
        self.entries
            .keys()
            .filter_map(|key| {
                if key.sender() == id {
                    Some(key.receiver().clone())
                } else if key.receiver() == id {
                    Some(key.sender().clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Counterparts whose pairing both agents accepted and for which this
    /// user has not yet given feedback.
    pub fn pending_human_approval(&self, id: &AgentId) -> Vec<AgentId> {
        self.counterparts_of(id)
            .into_iter()
            .filter(|other| {
                let outbound = self.entry(id, other);
                let inbound = self.entry(other, id);
                matches!(
                    (outbound, inbound),
                    (Some(out), Some(inb))
                        if out.accepted_by_agent()
                            && inb.accepted_by_agent()
                            && out.feedback == Feedback::Uncontacted
                )
            })
            .collect()
    }

    /// Counterparts confirmed via feedback by both users.
    pub fn established_relations(&self, id: &AgentId) -> Vec<AgentId> {
        self.counterparts_of(id)
            .into_iter()
            .filter(|other| {
                let outbound = self.entry(id, other);
                let inbound = self.entry(other, id);
                matches!(
                    (outbound, inbound),
                    (Some(out), Some(inb))
                        if out.feedback == Feedback::UserAccepted
                            && inb.feedback == Feedback::UserAccepted
                )
            })
            .collect()
    }

    /// Counterparts this agent has decided about while the reverse
    /// direction is still pending negotiation.
    pub fn one_sidedly_sent_pairs(&self, id: &AgentId) -> Vec<AgentId> {
        self.counterparts_of(id)
            .into_iter()
            .filter(|other| {
                let outbound = self.entry(id, other);
                let inbound = self.entry(other, id);
                matches!(
                    (outbound, inbound),
                    (Some(out), Some(inb)) if !out.is_placeholder() && inb.is_placeholder()
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Decision, InfoItem, Profile};

    fn id(name: &str) -> AgentId {
        AgentId::new(name)
    }

    fn accepted() -> RecordedVerdict {
        RecordedVerdict::now(Decision::Accepted, "looks good".to_string(), vec![])
    }

    fn refused() -> RecordedVerdict {
        RecordedVerdict::now(Decision::Refused, "no overlap".to_string(), vec![])
    }

    fn register(ledger: &mut RelationLedger, name: &str) -> Vec<AgentId> {
        ledger
            .register_agent(id(name), AgentSnapshot::default())
            .unwrap()
    }

    // ============== Registration Tests ==============

    #[test]
    fn test_register_returns_counterpart_snapshot() {
        let mut ledger = RelationLedger::new();
        assert!(register(&mut ledger, "alice").is_empty());
        assert_eq!(register(&mut ledger, "bob"), vec![id("alice")]);

        let counterparts = register(&mut ledger, "carol");
        assert_eq!(counterparts, vec![id("alice"), id("bob")]);
    }

    #[test]
    fn test_registration_completeness() {
        // After registering {A,B,C}, all 6 ordered pairs exist.
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        register(&mut ledger, "carol");

        assert_eq!(ledger.full().len(), 6);
        assert_eq!(
            ledger.all_registered(),
            vec![id("alice"), id("bob"), id("carol")]
        );
    }

    #[test]
    fn test_double_registration_fails() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        let err = ledger
            .register_agent(id("alice"), AgentSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, AccordError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_paused_agent_cannot_reregister() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        ledger.pause(&id("alice")).unwrap();

        let err = ledger
            .register_agent(id("alice"), AgentSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, AccordError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_newcomer_gets_no_placeholders_against_paused() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        ledger.pause(&id("alice")).unwrap();

        let counterparts = register(&mut ledger, "bob");
        assert!(counterparts.is_empty());
        assert!(ledger.full().is_empty());
    }

    // ============== Snapshot Tests ==============

    #[test]
    fn test_update_snapshot_replaces_stored_profile() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        let profile = Profile::new(vec![InfoItem::new("info_1", "ETH student")], vec![], vec![]);
        ledger
            .update_snapshot(&id("alice"), AgentSnapshot::from(&profile))
            .unwrap();

        assert_eq!(
            ledger.snapshot(&id("alice")).unwrap().public_text(),
            "ETH student"
        );
        // Existing verdicts stand.
        assert_eq!(
            ledger.entry(&id("alice"), &id("bob")).unwrap().agent_decision(),
            Decision::Accepted
        );
    }

    #[test]
    fn test_update_snapshot_unknown_agent_fails() {
        let mut ledger = RelationLedger::new();
        assert!(matches!(
            ledger.update_snapshot(&id("ghost"), AgentSnapshot::default()),
            Err(AccordError::UnknownAgent(_))
        ));
    }

    // ============== Directionality Tests ==============

    #[test]
    fn test_directions_are_independent() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");

        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        let forward = ledger.entry(&id("alice"), &id("bob")).unwrap();
        let reverse = ledger.entry(&id("bob"), &id("alice")).unwrap();
        assert_eq!(forward.agent_decision(), Decision::Accepted);
        assert_eq!(reverse.agent_decision(), Decision::Uncontacted);
    }

    #[test]
    fn test_verdict_last_writer_wins_per_oracle() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");

        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", refused())
            .unwrap();
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        let entry = ledger.entry(&id("alice"), &id("bob")).unwrap();
        assert_eq!(entry.verdicts.len(), 1);
        assert_eq!(entry.agent_decision(), Decision::Accepted);
    }

    #[test]
    fn test_multiple_oracles_per_direction() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");

        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();
        ledger
            .record_verdict(&id("alice"), &id("bob"), "apertus", refused())
            .unwrap();

        let entry = ledger.entry(&id("alice"), &id("bob")).unwrap();
        assert_eq!(entry.verdicts.len(), 2);
        // Collapse rule: any acceptance wins.
        assert_eq!(entry.agent_decision(), Decision::Accepted);
    }

    #[test]
    fn test_self_pair_rejected() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        let err = ledger
            .record_verdict(&id("alice"), &id("alice"), "llama", accepted())
            .unwrap_err();
        assert!(matches!(err, AccordError::SelfPair));
    }

    // ============== Feedback Tests ==============

    #[test]
    fn test_feedback_unknown_pair() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");

        let err = ledger
            .record_feedback(&id("alice"), &id("ghost"), Feedback::UserAccepted)
            .unwrap_err();
        assert!(matches!(err, AccordError::UnknownPair { .. }));
    }

    #[test]
    fn test_feedback_rejects_uncontacted_value() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");

        let err = ledger
            .record_feedback(&id("alice"), &id("bob"), Feedback::Uncontacted)
            .unwrap_err();
        assert!(matches!(err, AccordError::InvalidFeedback));
    }

    #[test]
    fn test_feedback_preserves_verdicts() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");

        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();
        ledger
            .record_feedback(&id("alice"), &id("bob"), Feedback::UserRefused)
            .unwrap();

        let entry = ledger.entry(&id("alice"), &id("bob")).unwrap();
        assert_eq!(entry.agent_decision(), Decision::Accepted);
        assert_eq!(entry.feedback, Feedback::UserRefused);
    }

    // ============== Lifecycle Tests ==============

    #[test]
    fn test_pause_resume_idempotent() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");

        ledger.pause(&id("alice")).unwrap();
        ledger.pause(&id("alice")).unwrap();
        assert_eq!(ledger.state_of(&id("alice")), RegistrationState::Paused);

        ledger.resume(&id("alice")).unwrap();
        ledger.resume(&id("alice")).unwrap();
        assert_eq!(ledger.state_of(&id("alice")), RegistrationState::Registered);
    }

    #[test]
    fn test_pause_unknown_agent_fails() {
        let mut ledger = RelationLedger::new();
        assert!(matches!(
            ledger.pause(&id("ghost")),
            Err(AccordError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_paused_entries_stay_visible() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        ledger.pause(&id("alice")).unwrap();
        assert_eq!(ledger.entries_for_agent(&id("alice")).len(), 2);
    }

    #[test]
    fn test_delete_purges_everything() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        register(&mut ledger, "carol");
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        ledger.delete_or_reset(&id("alice"));

        assert_eq!(ledger.state_of(&id("alice")), RegistrationState::Unregistered);
        assert!(ledger.snapshot(&id("alice")).is_none());
        assert!(ledger.entries_for_agent(&id("alice")).is_empty());
        // Entries among the survivors remain.
        assert_eq!(ledger.full().len(), 2);
        assert_eq!(ledger.all_registered(), vec![id("bob"), id("carol")]);
    }

    #[test]
    fn test_delete_unknown_agent_is_noop() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        ledger.delete_or_reset(&id("ghost"));
        assert_eq!(ledger.all_registered(), vec![id("alice")]);
    }

    // ============== Projection Tests ==============

    fn accepted_both_ways(ledger: &mut RelationLedger, a: &str, b: &str) {
        ledger
            .record_verdict(&id(a), &id(b), "llama", accepted())
            .unwrap();
        ledger
            .record_verdict(&id(b), &id(a), "llama", accepted())
            .unwrap();
    }

    #[test]
    fn test_pending_human_approval() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        accepted_both_ways(&mut ledger, "alice", "bob");

        assert_eq!(ledger.pending_human_approval(&id("alice")), vec![id("bob")]);
        assert_eq!(ledger.pending_human_approval(&id("bob")), vec![id("alice")]);

        // Alice confirms; only Bob is still pending.
        ledger
            .record_feedback(&id("alice"), &id("bob"), Feedback::UserAccepted)
            .unwrap();
        assert!(ledger.pending_human_approval(&id("alice")).is_empty());
        assert_eq!(ledger.pending_human_approval(&id("bob")), vec![id("alice")]);
    }

    #[test]
    fn test_pending_requires_both_agent_acceptances() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();
        ledger
            .record_verdict(&id("bob"), &id("alice"), "llama", refused())
            .unwrap();

        assert!(ledger.pending_human_approval(&id("alice")).is_empty());
    }

    #[test]
    fn test_established_requires_both_feedbacks() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        accepted_both_ways(&mut ledger, "alice", "bob");

        ledger
            .record_feedback(&id("alice"), &id("bob"), Feedback::UserAccepted)
            .unwrap();
        assert!(ledger.established_relations(&id("alice")).is_empty());

        ledger
            .record_feedback(&id("bob"), &id("alice"), Feedback::UserAccepted)
            .unwrap();
        assert_eq!(ledger.established_relations(&id("alice")), vec![id("bob")]);
        assert_eq!(ledger.established_relations(&id("bob")), vec![id("alice")]);
    }

    #[test]
    fn test_one_sidedly_sent_pairs() {
        let mut ledger = RelationLedger::new();
        register(&mut ledger, "alice");
        register(&mut ledger, "bob");
        ledger
            .record_verdict(&id("alice"), &id("bob"), "llama", accepted())
            .unwrap();

        assert_eq!(ledger.one_sidedly_sent_pairs(&id("alice")), vec![id("bob")]);
        assert!(ledger.one_sidedly_sent_pairs(&id("bob")).is_empty());

        ledger
            .record_verdict(&id("bob"), &id("alice"), "llama", refused())
            .unwrap();
        assert!(ledger.one_sidedly_sent_pairs(&id("alice")).is_empty());
    }
}
