//! ProfileStore - file-backed profile persistence

use serde::{Deserialize, Serialize};
use shared::{AgentId, Profile, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    profiles: BTreeMap<AgentId, Profile>,
}

/// A JSON file mapping agent ids to their extracted profiles.
///
/// Writes are whole-file: the store is small (one entry per user) and a full
/// rewrite per save keeps the format trivially inspectable.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    profiles: BTreeMap<AgentId, Profile>,
}

impl ProfileStore {
    /// Opens a store at `path`, loading existing contents if the file is
    /// already there.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let profiles = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&contents)?;
            file.profiles
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, profiles })
    }

    pub fn get(&self, id: &AgentId) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.profiles.keys().cloned().collect()
    }

    /// Inserts or replaces a profile and persists the store.
    pub fn save(&mut self, id: AgentId, profile: Profile) -> Result<()> {
        self.profiles.insert(id, profile);
        self.flush()
    }

    /// Removes a profile, if present, and persists the store.
    pub fn remove(&mut self, id: &AgentId) -> Result<()> {
        if self.profiles.remove(id).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let file = StoreFile {
            profiles: self.profiles.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, contents)?;
        tracing::debug!(path = %self.path.display(), count = self.profiles.len(), "profile store flushed");
        Ok(())
    }
}
