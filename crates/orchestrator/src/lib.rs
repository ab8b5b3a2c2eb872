//! # Accord Orchestrator
//!
//! The hub of the platform. The orchestrator owns the relation ledger,
//! drives the matching fan-out whenever a newly configured agent registers,
//! mirrors lifecycle transitions into the ledger, validates human feedback
//! and serves the read projections. A [`runtime::Runtime`] hosts the agent
//! tasks and wires each agent to the orchestrator through the
//! `OrchestratorLink` seam.
//!
//! Concurrency model: every ledger mutation happens behind one
//! `tokio::sync::Mutex`; an in-flight direction set under the same mutex
//! guarantees a single writer per directed pair, and registration snapshots
//! are taken under the mutex that installs the agent, so two agents
//! registering concurrently can never lose the pair between them.

pub mod hub;
pub mod runtime;

pub use hub::{Orchestrator, RelationReport};
pub use runtime::Runtime;
