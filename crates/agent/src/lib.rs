//! # Accord Agent
//!
//! The personal agent: one actor per user, holding the user's profile and a
//! set of named judgment oracles. The agent evaluates incoming pairing
//! requests against the user's policies, extracts the profile from free text
//! at onboarding, and mirrors lifecycle transitions to the orchestrator
//! through the `OrchestratorLink` seam.
//!
//! Every interaction goes through the mpsc mailbox in [`mailbox`]; the
//! message enum is closed and each variant carries a oneshot reply channel,
//! so no request kind can fall through a dispatch silently.

pub mod actor;
pub mod mailbox;
pub mod prompt;

pub use actor::PersonalAgent;
pub use mailbox::{spawn_agent_task, AgentHandle, AgentMsg};
