//! Collaborators the engine consumes but does not own.
//!
//! The issue store is the source of truth for task status; the engine only
//! reads tasks and conditionally resets them. Bundled SQLite adapters live in
//! [`crate::store`], and anything else can plug in through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use swarmyard_core::{GitWorkingMode, Task, UpdateTaskRequest};

use crate::error::Result;

/// A project the watchdog patrols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveryTarget {
    pub project_id: String,
    pub repo_path: PathBuf,
}

impl RecoveryTarget {
    pub fn new(project_id: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            repo_path: repo_path.into(),
        }
    }
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn show(&self, project_id: &str, task_id: &str) -> Result<Option<Task>>;

    /// Ids of the tasks that must complete before `task_id`.
    async fn get_blockers(&self, project_id: &str, task_id: &str) -> Result<Vec<String>>;

    async fn add_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()>;

    async fn remove_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()>;

    /// Fails with `TaskNotFound` when the task does not exist.
    async fn update(&self, project_id: &str, task_id: &str, update: &UpdateTaskRequest)
        -> Result<()>;

    /// In-progress tasks assigned to a coding agent rather than a human.
    async fn list_in_progress_with_agent_assignee(&self, project_id: &str) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    async fn project_id_for_repo(&self, repo_path: &Path) -> Result<Option<String>>;

    /// Projects that should currently be patrolled.
    async fn active_targets(&self) -> Result<Vec<RecoveryTarget>>;
}

#[async_trait]
pub trait ProjectSettings: Send + Sync {
    async fn git_working_mode(&self, project_id: &str) -> Result<GitWorkingMode>;
}

/// Read-only view of work the dispatcher knows to be alive.
///
/// Recovery never touches a task that appears in either set.
#[async_trait]
pub trait ActiveWork: Send + Sync {
    /// Tasks occupying a dispatcher worker slot.
    async fn slotted_task_ids(&self) -> Result<HashSet<String>>;

    /// Tasks with a live agent process registered.
    async fn active_agent_ids(&self) -> Result<HashSet<String>>;

    async fn excluded_task_ids(&self) -> Result<HashSet<String>> {
        let mut ids = self.slotted_task_ids().await?;
        ids.extend(self.active_agent_ids().await?);
        Ok(ids)
    }
}
