//! Named oracle sets
//!
//! A personal agent may run several judgment oracles side by side for
//! comparison. Each has a stable name (the ledger keys verdicts by it) and
//! an active flag the user can toggle; only active oracles evaluate new
//! pairing requests.

use crate::OracleRef;
use shared::{AccordError, Result};
use std::collections::BTreeMap;

struct Entry {
    oracle: OracleRef,
    active: bool,
}

/// The set of named oracles available to one agent.
#[derive(Default)]
pub struct OracleSet {
    entries: BTreeMap<String, Entry>,
}

impl OracleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an oracle under a name, active by default. Replaces any oracle
    /// previously registered under the same name.
    pub fn insert(&mut self, name: impl Into<String>, oracle: OracleRef) {
        self.entries.insert(
            name.into(),
            Entry {
                oracle,
                active: true,
            },
        );
    }

    /// All registered oracle names, active or not.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Names of the currently active oracles.
    pub fn active_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Active oracles with their names, in name order.
    pub fn active(&self) -> Vec<(String, OracleRef)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(name, entry)| (name.clone(), entry.oracle.clone()))
            .collect()
    }

    /// Name → active flag, as surfaced to the user.
    pub fn statuses(&self) -> BTreeMap<String, bool> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.active))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the user's active/inactive choices.
    ///
    /// Unknown names are rejected, and the update must leave at least one
    /// oracle active: an agent with no judge cannot answer pairing requests.
    pub fn set_active(&mut self, updates: &BTreeMap<String, bool>) -> Result<()> {
        for name in updates.keys() {
            if !self.entries.contains_key(name) {
                return Err(AccordError::Config(format!("unknown oracle '{name}'")));
            }
        }

        let would_be_active = self.entries.iter().any(|(name, entry)| {
            updates.get(name).copied().unwrap_or(entry.active)
        });
        if !would_be_active {
            return Err(AccordError::Config(
                "at least one oracle must stay active".to_string(),
            ));
        }

        for (name, active) in updates {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.active = *active;
            }
        }
        Ok(())
    }
}
