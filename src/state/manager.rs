//! StateManager - loads and saves the ledger snapshot file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ledger::{LedgerSnapshot, MemoryLedger};
use crate::Result;

/// Owns the location of a ledger snapshot.
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Restore the ledger, or start an empty one if no snapshot exists yet.
    ///
    /// `creator` identifies the organisation of the first transaction.
    pub fn load(&self, creator: &str) -> Result<MemoryLedger> {
        debug!(path = %self.path.display(), "StateManager::load");
        if !self.path.exists() {
            debug!("no snapshot yet, starting from an empty ledger");
            return Ok(MemoryLedger::new(creator));
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&content)?;
        Ok(MemoryLedger::from_snapshot(snapshot, creator))
    }

    /// Write the committed state, creating the parent directory if needed.
    pub fn save(&self, ledger: &MemoryLedger) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = ledger.snapshot()?;
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, content)?;
        debug!(
            path = %self.path.display(),
            entries = snapshot.state.len(),
            "StateManager::save"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
