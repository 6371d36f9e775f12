//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use swarmyard_core::{GitWorkingMode, Task, TaskStatus, UpdateTaskRequest};
use tempfile::TempDir;
use vcs::{TaskWorktree, VcsError, WorkingTreeManager};

use crate::error::{OrchestratorError, Result};
use crate::heartbeat::{HeartbeatSource, WorkerHeartbeat};
use crate::traits::{IssueStore, ProjectRegistry, ProjectSettings, RecoveryTarget};

/// File whose presence makes a [`FakeWorktrees`] checkout count as dirty.
pub const DIRTY_MARKER: &str = "uncommitted.txt";

pub async fn sqlite_pool() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (pool, dir)
}

#[derive(Default)]
struct StoreInner {
    tasks: BTreeMap<(String, String), Task>,
    calls: HashMap<&'static str, usize>,
    fail_reads: bool,
}

#[derive(Default)]
pub struct InMemoryIssueStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Task) {
        let key = (task.project_id.clone(), task.id.clone());
        self.inner.lock().unwrap().tasks.insert(key, task);
    }

    pub fn get(&self, project_id: &str, task_id: &str) -> Option<Task> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .get(&(project_id.to_string(), task_id.to_string()))
            .cloned()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.inner.lock().unwrap().calls.get(name).copied().unwrap_or(0)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    fn read(&self, name: &'static str) -> Result<std::sync::MutexGuard<'_, StoreInner>> {
        let mut inner = self.inner.lock().unwrap();
        *inner.calls.entry(name).or_default() += 1;
        if inner.fail_reads {
            return Err(OrchestratorError::store("store unavailable"));
        }
        Ok(inner)
    }
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn show(&self, project_id: &str, task_id: &str) -> Result<Option<Task>> {
        let inner = self.read("show")?;
        Ok(inner
            .tasks
            .get(&(project_id.to_string(), task_id.to_string()))
            .cloned())
    }

    async fn get_blockers(&self, project_id: &str, task_id: &str) -> Result<Vec<String>> {
        let inner = self.read("get_blockers")?;
        Ok(inner
            .tasks
            .get(&(project_id.to_string(), task_id.to_string()))
            .map(|t| t.depends_on.clone())
            .unwrap_or_default())
    }

    async fn add_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .tasks
            .get_mut(&(project_id.to_string(), task_id.to_string()))
            .ok_or_else(|| OrchestratorError::task_not_found(project_id, task_id))?;
        if !task.labels.iter().any(|l| l == label) {
            task.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn remove_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner
            .tasks
            .get_mut(&(project_id.to_string(), task_id.to_string()))
        {
            task.labels.retain(|l| l != label);
        }
        Ok(())
    }

    async fn update(
        &self,
        project_id: &str,
        task_id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .tasks
            .get_mut(&(project_id.to_string(), task_id.to_string()))
            .ok_or_else(|| OrchestratorError::task_not_found(project_id, task_id))?;
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(assignee) = &update.assignee {
            task.assignee = assignee.clone();
        }
        Ok(())
    }

    async fn list_in_progress_with_agent_assignee(&self, project_id: &str) -> Result<Vec<Task>> {
        let inner = self.read("list_in_progress")?;
        Ok(inner
            .tasks
            .values()
            .filter(|t| {
                t.project_id == project_id
                    && t.status == TaskStatus::InProgress
                    && t.has_agent_assignee()
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct StaticRegistry {
    projects: Vec<(String, PathBuf)>,
    failing: bool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, id: &str, repo_path: impl Into<PathBuf>) -> Self {
        self.projects.push((id.to_string(), repo_path.into()));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl ProjectRegistry for StaticRegistry {
    async fn project_id_for_repo(&self, repo_path: &Path) -> Result<Option<String>> {
        if self.failing {
            return Err(OrchestratorError::store("registry unavailable"));
        }
        Ok(self
            .projects
            .iter()
            .find(|(_, path)| path == repo_path)
            .map(|(id, _)| id.clone()))
    }

    async fn active_targets(&self) -> Result<Vec<RecoveryTarget>> {
        if self.failing {
            return Err(OrchestratorError::store("registry unavailable"));
        }
        Ok(self
            .projects
            .iter()
            .map(|(id, path)| RecoveryTarget::new(id.clone(), path.clone()))
            .collect())
    }
}

pub struct StaticSettings(GitWorkingMode);

impl StaticSettings {
    pub fn new(mode: GitWorkingMode) -> Self {
        Self(mode)
    }
}

#[async_trait]
impl ProjectSettings for StaticSettings {
    async fn git_working_mode(&self, _project_id: &str) -> Result<GitWorkingMode> {
        Ok(self.0)
    }
}

pub struct StaticHeartbeats(Vec<WorkerHeartbeat>);

impl StaticHeartbeats {
    pub fn new(heartbeats: Vec<WorkerHeartbeat>) -> Self {
        Self(heartbeats)
    }
}

#[async_trait]
impl HeartbeatSource for StaticHeartbeats {
    async fn find_stale_heartbeats(&self, _base_dir: &Path) -> Result<Vec<WorkerHeartbeat>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct WorktreeLog {
    commits: Vec<(String, PathBuf)>,
    removals: Vec<String>,
    fail_commit: HashSet<String>,
}

/// Directory-backed stand-in for git: a checkout is a plain directory and
/// "uncommitted work" is the presence of [`DIRTY_MARKER`].
pub struct FakeWorktrees {
    base: PathBuf,
    log: Mutex<WorktreeLog>,
}

impl FakeWorktrees {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            log: Mutex::new(WorktreeLog::default()),
        }
    }

    pub fn make_worktree(&self, repo_path: &Path, task_id: &str, dirty: bool) -> PathBuf {
        let path = self.worktree_path(repo_path, task_id);
        std::fs::create_dir_all(&path).unwrap();
        if dirty {
            std::fs::write(path.join(DIRTY_MARKER), "partial work").unwrap();
        }
        path
    }

    pub fn fail_commit_for(&self, task_id: &str) {
        self.log.lock().unwrap().fail_commit.insert(task_id.to_string());
    }

    pub fn commits(&self) -> Vec<String> {
        self.log.lock().unwrap().commits.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn commit_paths(&self) -> Vec<PathBuf> {
        self.log.lock().unwrap().commits.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn removals(&self) -> Vec<String> {
        self.log.lock().unwrap().removals.clone()
    }
}

#[async_trait]
impl WorkingTreeManager for FakeWorktrees {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn worktree_base_path(&self, _repo_path: &Path) -> PathBuf {
        self.base.clone()
    }

    fn worktree_path(&self, repo_path: &Path, task_id: &str) -> PathBuf {
        self.worktree_base_path(repo_path).join(format!("task-{task_id}"))
    }

    fn branch_name(&self, task_id: &str) -> String {
        format!("task-{task_id}")
    }

    async fn create_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        _base_branch: &str,
    ) -> vcs::Result<TaskWorktree> {
        let path = self.make_worktree(repo_path, task_id, false);
        Ok(TaskWorktree::new(task_id, path, self.branch_name(task_id)))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> vcs::Result<bool> {
        Ok(path.join(DIRTY_MARKER).exists())
    }

    async fn commit_wip(&self, path: &Path, task_id: &str) -> vcs::Result<Option<String>> {
        if self.log.lock().unwrap().fail_commit.contains(task_id) {
            return Err(VcsError::CommandFailed("git commit failed: hook exploded".to_string()));
        }
        if !self.has_uncommitted_changes(path).await? {
            return Ok(None);
        }

        std::fs::remove_file(path.join(DIRTY_MARKER))?;
        self.log
            .lock()
            .unwrap()
            .commits
            .push((task_id.to_string(), path.to_path_buf()));
        Ok(Some(format!("wip-{task_id}")))
    }

    async fn remove_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        known_path: Option<&Path>,
    ) -> vcs::Result<bool> {
        let path = known_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.worktree_path(repo_path, task_id));
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)?;
        self.log.lock().unwrap().removals.push(task_id.to_string());
        Ok(true)
    }

    async fn list_task_worktrees(&self, _repo_path: &Path) -> vcs::Result<Vec<TaskWorktree>> {
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.base) else {
            return Ok(found);
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_prefix("task-") {
                found.push(TaskWorktree::new(id, entry.path(), name.clone()));
            }
        }
        Ok(found)
    }
}
