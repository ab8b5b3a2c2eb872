//! Orchestrator link seam
//!
//! Personal agents notify the orchestrator about setup completion and
//! lifecycle actions through this trait instead of a concrete type, so the
//! agent crate never depends on the orchestrator crate. The orchestrator is
//! an explicitly constructed instance injected at spawn time; there is no
//! global runtime.

use crate::error::Result;
use crate::message::{ActionKind, ConfigurationMessage};
use crate::profile::AgentId;
use async_trait::async_trait;

/// Interface a personal agent uses to reach the orchestrator.
#[async_trait]
pub trait OrchestratorLink: Send + Sync {
    /// Registers the agent's extracted snapshot and schedules the matching
    /// fan-out against every other registered agent.
    async fn configure(&self, message: ConfigurationMessage) -> Result<()>;

    /// Mirrors a lifecycle transition (pause/resume/delete/reset) into the
    /// relation ledger.
    async fn apply_action(&self, kind: ActionKind, user: &AgentId) -> Result<()>;

    /// Replaces the agent's stored public snapshot without renegotiating.
    /// Verdicts already recorded stand; later registrants negotiate against
    /// the fresh snapshot.
    async fn update_profile(&self, message: ConfigurationMessage) -> Result<()>;
}

/// Link that drops every notification; used by agent unit tests that do not
/// exercise orchestration.
#[derive(Debug, Clone, Default)]
pub struct NullLink;

#[async_trait]
impl OrchestratorLink for NullLink {
    async fn configure(&self, _message: ConfigurationMessage) -> Result<()> {
        Ok(())
    }

    async fn apply_action(&self, _kind: ActionKind, _user: &AgentId) -> Result<()> {
        Ok(())
    }

    async fn update_profile(&self, _message: ConfigurationMessage) -> Result<()> {
        Ok(())
    }
}
