//! Liveness evidence written by workers into their working directories.
//!
//! A worker periodically rewrites a small JSON file in its checkout. Recovery
//! treats a checkout whose heartbeat has gone quiet for longer than the
//! staleness threshold as abandoned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vcs::WorkingTreeManager;

use crate::error::Result;
use crate::traits::{ActiveWork, ProjectRegistry};

pub const DEFAULT_HEARTBEAT_FILE: &str = ".swarmyard-heartbeat";
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);
pub const DEFAULT_DIR_PREFIX: &str = "task-";

/// Heartbeat files larger than this are not parsed.
const MAX_HEARTBEAT_FILE_SIZE: u64 = 4096;

/// On-disk heartbeat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// A heartbeat as found in a worker directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHeartbeat {
    pub task_id: String,
    pub worker_dir: PathBuf,
    pub last_beat: DateTime<Utc>,
    pub pid: Option<u32>,
}

impl WorkerHeartbeat {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_beat).to_std().unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    /// Worker directories under `base_dir` whose heartbeat is older than the
    /// staleness threshold.
    async fn find_stale_heartbeats(&self, base_dir: &Path) -> Result<Vec<WorkerHeartbeat>>;
}

/// Reads heartbeat files from the immediate subdirectories of a base path.
#[derive(Debug, Clone)]
pub struct FileHeartbeatSource {
    file_name: String,
    stale_after: Duration,
    dir_prefix: String,
}

impl Default for FileHeartbeatSource {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_FILE, DEFAULT_STALE_AFTER)
    }
}

impl FileHeartbeatSource {
    pub fn new(file_name: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            file_name: file_name.into(),
            stale_after,
            dir_prefix: DEFAULT_DIR_PREFIX.to_string(),
        }
    }

    /// Prefix stripped from a directory name when the heartbeat carries no task id.
    pub fn with_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dir_prefix = prefix.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn is_stale(&self, heartbeat: &WorkerHeartbeat, now: DateTime<Utc>) -> bool {
        heartbeat.age(now) > self.stale_after
    }

    /// Every heartbeat under `base_dir`. A missing base yields nothing.
    pub async fn scan(&self, base_dir: &Path) -> Result<Vec<WorkerHeartbeat>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(heartbeat) = self.read_dir(&entry.path()).await {
                found.push(heartbeat);
            }
        }

        found.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(found)
    }

    pub async fn find_fresh(&self, base_dir: &Path) -> Result<Vec<WorkerHeartbeat>> {
        let now = Utc::now();
        Ok(self
            .scan(base_dir)
            .await?
            .into_iter()
            .filter(|hb| !self.is_stale(hb, now))
            .collect())
    }

    /// Heartbeat in `dir` itself, if it has one.
    ///
    /// Unreadable or malformed files fall back to the file's mtime, and a
    /// missing task id falls back to the directory name.
    pub async fn read_dir(&self, dir: &Path) -> Option<WorkerHeartbeat> {
        let path = dir.join(&self.file_name);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        let parsed = if metadata.len() <= MAX_HEARTBEAT_FILE_SIZE {
            match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Heartbeat>(&bytes)
                    .map_err(|e| {
                        warn!(path = %path.display(), error = %e, "Malformed heartbeat, using mtime");
                    })
                    .ok(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable heartbeat, using mtime");
                    None
                }
            }
        } else {
            warn!(path = %path.display(), size = metadata.len(), "Oversized heartbeat, using mtime");
            None
        };

        let (task_id, pid, last_beat) = match parsed {
            Some(hb) => (hb.task_id, hb.pid, hb.timestamp),
            None => {
                let modified = metadata.modified().ok()?;
                (None, None, DateTime::<Utc>::from(modified))
            }
        };

        let task_id = task_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.task_id_from_dir(dir))?;

        Some(WorkerHeartbeat {
            task_id,
            worker_dir: dir.to_path_buf(),
            last_beat,
            pid,
        })
    }

    fn task_id_from_dir(&self, dir: &Path) -> Option<String> {
        let name = dir.file_name()?.to_str()?;
        let id = name.strip_prefix(&self.dir_prefix).unwrap_or(name);
        (!id.is_empty()).then(|| id.to_string())
    }
}

#[async_trait]
impl HeartbeatSource for FileHeartbeatSource {
    async fn find_stale_heartbeats(&self, base_dir: &Path) -> Result<Vec<WorkerHeartbeat>> {
        let now = Utc::now();
        let stale: Vec<_> = self
            .scan(base_dir)
            .await?
            .into_iter()
            .filter(|hb| self.is_stale(hb, now))
            .collect();

        debug!(base = %base_dir.display(), stale = stale.len(), "Scanned heartbeats");
        Ok(stale)
    }
}

/// Atomically write a heartbeat for `task_id` into `dir`.
pub async fn write_heartbeat(dir: &Path, file_name: &str, task_id: &str) -> Result<PathBuf> {
    let heartbeat = Heartbeat {
        task_id: Some(task_id.to_string()),
        pid: Some(std::process::id()),
        timestamp: Utc::now(),
    };
    let json = serde_json::to_vec_pretty(&heartbeat)?;

    let path = dir.join(file_name);
    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, &path).await?;

    Ok(path)
}

/// Live-worker exclusion set derived from fresh heartbeats.
///
/// Lets a standalone watchdog avoid tasks whose workers are still beating
/// when no in-process dispatcher can report its slots.
pub struct HeartbeatActivity {
    source: FileHeartbeatSource,
    worktrees: Arc<dyn WorkingTreeManager>,
    registry: Arc<dyn ProjectRegistry>,
}

impl HeartbeatActivity {
    pub fn new(
        source: FileHeartbeatSource,
        worktrees: Arc<dyn WorkingTreeManager>,
        registry: Arc<dyn ProjectRegistry>,
    ) -> Self {
        Self {
            source,
            worktrees,
            registry,
        }
    }
}

#[async_trait]
impl ActiveWork for HeartbeatActivity {
    async fn slotted_task_ids(&self) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn active_agent_ids(&self) -> Result<HashSet<String>> {
        let now = Utc::now();
        let mut ids = HashSet::new();

        for target in self.registry.active_targets().await? {
            let base = self.worktrees.worktree_base_path(&target.repo_path);
            ids.extend(self.source.find_fresh(&base).await?.into_iter().map(|hb| hb.task_id));

            // Branches mode works in the repository itself.
            if let Some(hb) = self.source.read_dir(&target.repo_path).await {
                if !self.source.is_stale(&hb, now) {
                    ids.insert(hb.task_id);
                }
            }
        }
        Ok(ids)
    }
}
