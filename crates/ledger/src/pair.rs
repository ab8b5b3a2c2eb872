//! Directed pair key

use serde::{Deserialize, Serialize};
use shared::{AccordError, AgentId, Result};
use std::fmt;

/// Key of one ledger entry: the directed pair (sender, receiver).
///
/// The entry under `(X, Y)` records X's stance toward Y: the verdicts X's
/// own oracles reached about Y's request, and the feedback X's user gave.
/// `(X, Y)` and `(Y, X)` are distinct entries with independent lifecycles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    sender: AgentId,
    receiver: AgentId,
}

impl PairKey {
    /// Builds a key, rejecting a pair of an agent with itself.
    pub fn new(sender: AgentId, receiver: AgentId) -> Result<Self> {
        if sender == receiver {
            return Err(AccordError::SelfPair);
        }
        Ok(Self { sender, receiver })
    }

    pub fn sender(&self) -> &AgentId {
        &self.sender
    }

    pub fn receiver(&self) -> &AgentId {
        &self.receiver
    }

    /// The same pair with the direction flipped.
    pub fn reversed(&self) -> Self {
        Self {
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.sender, self.receiver)
    }
}
