//! Error types for Accord

use crate::profile::AgentId;
use thiserror::Error;

/// General Accord error type.
///
/// Protocol errors (caller misuse) and state errors are all typed here so the
/// boundary layer can translate them into HTTP-style responses; none of them
/// is fatal to the process.
#[derive(Debug, Error)]
pub enum AccordError {
    #[error("agent '{0}' is already registered")]
    AlreadyRegistered(AgentId),

    #[error("agent '{0}' is not known to the orchestrator")]
    UnknownAgent(AgentId),

    #[error("no negotiated pair from '{sender}' to '{receiver}'")]
    UnknownPair { sender: AgentId, receiver: AgentId },

    #[error("sender and receiver of a pairing must differ")]
    SelfPair,

    #[error("feedback must be an explicit user acceptance or refusal")]
    InvalidFeedback,

    #[error("profile extraction failed after {attempts} attempts")]
    ExtractionFailed { attempts: u32 },

    #[error("oracle '{name}' failed: {reason}")]
    Oracle { name: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AccordError>;
