use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{tlog_debug, Error, Result};

const DEFAULT_ROOT_MANAGER_INTERVAL_MS: u64 = 1000;
const DEFAULT_WORKSPACE_MANAGER_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often the root manager scans for eligible roots.
    #[serde(default = "default_root_interval")]
    pub root_manager_interval_ms: u64,
    /// How often the workspace manager scans for eligible workspaces.
    #[serde(default = "default_workspace_interval")]
    pub workspace_manager_interval_ms: u64,
    /// Optional JSON snapshot the in-memory store is loaded from and saved to.
    pub state_path: Option<String>,
    #[serde(default)]
    pub snapshot_on_shutdown: bool,
}

fn default_root_interval() -> u64 {
    DEFAULT_ROOT_MANAGER_INTERVAL_MS
}

fn default_workspace_interval() -> u64 {
    DEFAULT_WORKSPACE_MANAGER_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_manager_interval_ms: DEFAULT_ROOT_MANAGER_INTERVAL_MS,
            workspace_manager_interval_ms: DEFAULT_WORKSPACE_MANAGER_INTERVAL_MS,
            state_path: None,
            snapshot_on_shutdown: false,
        }
    }
}

impl Config {
    pub fn tickflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".tickflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::tickflow_dir()?.join("tickflow.toml"))
    }

    pub fn root_manager_interval(&self) -> Duration {
        Duration::from_millis(self.root_manager_interval_ms.max(1))
    }

    pub fn workspace_manager_interval(&self) -> Duration {
        Duration::from_millis(self.workspace_manager_interval_ms.max(1))
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.state_path.as_deref().map(expand_tilde)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        tlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            tlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        tlog_debug!(
            "Config loaded: root_interval={}ms workspace_interval={}ms state_path={:?}",
            config.root_manager_interval_ms,
            config.workspace_manager_interval_ms,
            config.state_path
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        tlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let dir = Self::tickflow_dir()?;
        if !dir.exists() {
            tlog_debug!("Creating tickflow directory: {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
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
