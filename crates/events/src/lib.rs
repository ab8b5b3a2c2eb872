//! # Accord Events
//!
//! Bounded in-memory event log of everything the orchestrator does, plus
//! file-backed persistence for agent profiles so a restarted process can
//! re-onboard users without repeating extraction.

pub mod log;
pub mod store;

pub use log::{EventKind, EventLog, EventRecord, EventStats};
pub use store::ProfileStore;
