use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// Page size used by paginated queries when neither the caller nor the
/// config file sets one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Organisation recorded as transaction creator when none is given.
pub const DEFAULT_CREATOR: &str = "local-org";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where the ledger snapshot lives.
    pub state_path: Option<String>,
    pub default_page_size: Option<u32>,
    /// Organisation used as transaction creator by the CLI.
    pub creator: Option<String>,
}

impl Config {
    pub fn fedplan_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".fedplan"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::fedplan_dir()?.join("fedplan.toml"))
    }

    pub fn effective_state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(Self::fedplan_dir()?.join("ledger.json")),
        }
    }

    pub fn effective_page_size(&self) -> u32 {
        match self.default_page_size {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(size) => size,
        }
    }

    pub fn effective_creator(&self) -> &str {
        self.creator.as_deref().unwrap_or(DEFAULT_CREATOR)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            state_path = ?config.state_path,
            default_page_size = ?config.default_page_size,
            creator = ?config.creator,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
