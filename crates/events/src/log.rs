//! EventLog - bounded ring of orchestrator events

use serde::{Deserialize, Serialize};
use shared::AgentId;
use std::collections::VecDeque;
use uuid::Uuid;

/// One recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub timestamp: String,
    pub kind: EventKind,
    /// Agent the event is about, when there is one.
    pub agent: Option<AgentId>,
    pub detail: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Types of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentRegistered,
    AgentPaused,
    AgentResumed,
    AgentDeleted,
    AgentReset,
    MatchStarted,
    VerdictRecorded,
    VerdictRefusedFailClosed,
    InjectionSuspected,
    FeedbackRecorded,
    ProfileUpdated,
}

/// Bounded ring of events; oldest entries are dropped first.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    max_entries: usize,
}

impl EventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    pub fn record(
        &mut self,
        kind: EventKind,
        agent: Option<AgentId>,
        detail: Option<String>,
        metadata: Option<serde_json::Value>,
    ) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(EventRecord {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            agent,
            detail,
            metadata,
        });
    }

    /// Most recent entries first.
    pub fn get_recent(&self, limit: usize) -> Vec<&EventRecord> {
        self.entries.iter().rev().take(limit).collect()
    }

    /// Most recent entries of one kind, newest first.
    pub fn get_recent_of_kind(&self, kind: EventKind, limit: usize) -> Vec<&EventRecord> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| entry.kind == kind)
            .take(limit)
            .collect()
    }

    pub fn get_stats(&self) -> EventStats {
        let total = self.entries.len();
        let refusals = self
            .entries
            .iter()
            .filter(|entry| {
                matches!(
                    entry.kind,
                    EventKind::VerdictRefusedFailClosed | EventKind::InjectionSuspected
                )
            })
            .count();
        EventStats {
            total_entries: total,
            defensive_refusals: refusals,
        }
    }

    pub fn export_json(&self) -> serde_json::Value {
        serde_json::to_value(self.entries.iter().collect::<Vec<_>>()).unwrap_or_default()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(10000)
    }
}

/// Summary counters over the log.
#[derive(Debug, Clone)]
pub struct EventStats {
    pub total_entries: usize,
    /// Verdicts recorded by the fail-closed paths rather than an oracle.
    pub defensive_refusals: usize,
}
