use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use vcs::WorktreeConfig;

use crate::error::{OrchestratorError, Result};
use crate::heartbeat::{FileHeartbeatSource, DEFAULT_HEARTBEAT_FILE};

pub const SWARMYARD_DIR: &str = ".swarmyard";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "swarmyard.db";

/// Engine configuration stored in ~/.swarmyard/config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub worktrees: WorktreesConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_heartbeat_file")]
    pub heartbeat_file: String,

    #[serde(default = "default_wip_commit_prefix")]
    pub wip_commit_prefix: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            heartbeat_file: default_heartbeat_file(),
            wip_commit_prefix: default_wip_commit_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreesConfig {
    /// Defaults to `<repo parent>/.workspaces/<repo name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

impl Default for WorktreesConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            branch_prefix: default_branch_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    120
}

fn default_heartbeat_file() -> String {
    DEFAULT_HEARTBEAT_FILE.to_string()
}

fn default_wip_commit_prefix() -> String {
    "WIP".to_string()
}

fn default_branch_prefix() -> String {
    "task-".to_string()
}

/// `~/.swarmyard`, or `./.swarmyard` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SWARMYARD_DIR)
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE)
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog.interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.recovery.stale_after_secs)
    }

    pub fn worktree_config(&self) -> WorktreeConfig {
        let mut config = WorktreeConfig::default().with_branch_prefix(&self.worktrees.branch_prefix);
        config.base_dir = self.worktrees.base_dir.clone();
        config.wip_commit_prefix = self.recovery.wip_commit_prefix.clone();
        config
    }

    pub fn heartbeat_source(&self) -> FileHeartbeatSource {
        FileHeartbeatSource::new(&self.recovery.heartbeat_file, self.stale_after())
            .with_dir_prefix(&self.worktrees.branch_prefix)
    }

    /// Database file, relative paths resolved against `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join(DEFAULT_DB_NAME),
        }
    }

    pub fn database_url(&self, config_dir: &Path) -> String {
        format!("sqlite:{}", self.database_path(config_dir).display())
    }
}
