use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A checkout dedicated to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWorktree {
    pub task_id: String,
    pub path: PathBuf,
    pub branch_name: String,
}

impl TaskWorktree {
    pub fn new(task_id: impl Into<String>, path: PathBuf, branch_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            path,
            branch_name: branch_name.into(),
        }
    }
}

/// Operations the engine needs on a repository's working trees.
///
/// Implementations must never switch the branch checked out in a tree they
/// did not create; other workers may be using it.
#[async_trait]
pub trait WorkingTreeManager: Send + Sync {
    /// Name of the backend
    fn name(&self) -> &'static str;

    /// Directory holding all task checkouts for a repository
    fn worktree_base_path(&self, repo_path: &Path) -> PathBuf;

    /// Checkout directory for a task
    fn worktree_path(&self, repo_path: &Path, task_id: &str) -> PathBuf;

    /// Branch a task's work lives on
    fn branch_name(&self, task_id: &str) -> String;

    /// Create a checkout for a task on a new branch cut from `base_branch`
    async fn create_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        base_branch: &str,
    ) -> Result<TaskWorktree>;

    /// Whether the tree at `path` has staged, unstaged or untracked changes
    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;

    /// Commit everything in `path` as a labelled work-in-progress commit.
    ///
    /// Returns the new commit id, or `None` when there was nothing to commit.
    async fn commit_wip(&self, path: &Path, task_id: &str) -> Result<Option<String>>;

    /// Remove a task's checkout, leaving its branch in place.
    ///
    /// Returns `false` when there was no checkout to remove.
    async fn remove_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        known_path: Option<&Path>,
    ) -> Result<bool>;

    /// All task checkouts registered in the repository
    async fn list_task_worktrees(&self, repo_path: &Path) -> Result<Vec<TaskWorktree>>;
}
