//! # Accord Oracle
//!
//! Abstraction over the external judgment backends (LLMs). An oracle is an
//! opaque text-completion endpoint; everything Accord derives from it
//! (structured profiles, pairing verdicts, injection screens, response
//! verification) goes through the parsing helpers and defense strategies in
//! this crate. Parsing always fails closed: an answer that cannot be read as
//! an acceptance is never treated as one.

pub mod defense;
pub mod parse;
pub mod scripted;
pub mod set;

// Re-exports
pub use defense::*;
pub use parse::*;
pub use scripted::*;
pub use set::*;

use async_trait::async_trait;
use shared::{AccordError, Result};
use std::sync::Arc;
use std::time::Duration;

/// A judgment oracle: one external LLM backend.
///
/// Implementations wrap a vendor client; the core only ever sees prompt in,
/// free text out. Errors are surfaced as values and handled fail-closed by
/// the callers.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Runs one oracle call under a deadline.
///
/// A call that never returns must not wedge a negotiation direction; the
/// caller records a refusal when this returns an error.
pub async fn complete_with_timeout(
    oracle: &dyn Oracle,
    name: &str,
    prompt: &str,
    deadline: Duration,
) -> Result<String> {
    match tokio::time::timeout(deadline, oracle.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(AccordError::Oracle {
            name: name.to_string(),
            reason: format!("timed out after {}s", deadline.as_secs()),
        }),
    }
}

/// Shared handle to a dynamically dispatched oracle.
pub type OracleRef = Arc<dyn Oracle>;
