use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::WorktreeConfig;
use crate::error::{Result, VcsError};
use crate::traits::{TaskWorktree, WorkingTreeManager};

/// Task checkouts backed by `git worktree`.
///
/// One instance serves every repository; paths are derived per call from the
/// repository path and the shared [`WorktreeConfig`].
#[derive(Debug, Clone, Default)]
pub struct GitWorktrees {
    config: WorktreeConfig,
}

impl GitWorktrees {
    pub fn new(config: WorktreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorktreeConfig {
        &self.config
    }

    async fn run_git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        debug!(?args, cwd = %cwd.display(), "Running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn path_arg(path: &Path) -> Result<&str> {
        path.to_str()
            .ok_or_else(|| VcsError::InvalidPath(path.display().to_string()))
    }

    fn wip_message(&self, task_id: &str) -> String {
        format!(
            "{}: preserve unfinished work for task {}",
            self.config.wip_commit_prefix, task_id
        )
    }

    async fn prune(&self, repo_path: &Path) {
        if let Err(e) = self.run_git(&["worktree", "prune"], repo_path).await {
            warn!(repo = %repo_path.display(), error = %e, "git worktree prune failed");
        }
    }

    fn parse_worktree_list(&self, output: &str) -> Vec<TaskWorktree> {
        let mut worktrees = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        let mut current_branch: Option<String> = None;

        let mut flush = |path: Option<PathBuf>, branch: Option<String>| {
            if let (Some(path), Some(branch)) = (path, branch) {
                if let Some(task_id) = branch.strip_prefix(&self.config.branch_prefix) {
                    if !task_id.is_empty() {
                        worktrees.push(TaskWorktree::new(task_id, path, branch.clone()));
                    }
                }
            }
        };

        for line in output.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                current_branch = Some(branch.to_string());
            } else if line.is_empty() {
                flush(current_path.take(), current_branch.take());
            }
        }
        flush(current_path, current_branch);

        worktrees
    }
}

#[async_trait]
impl WorkingTreeManager for GitWorktrees {
    fn name(&self) -> &'static str {
        "git"
    }

    fn worktree_base_path(&self, repo_path: &Path) -> PathBuf {
        self.config.base_path_for(repo_path)
    }

    fn worktree_path(&self, repo_path: &Path, task_id: &str) -> PathBuf {
        self.worktree_base_path(repo_path)
            .join(format!("{}{}", self.config.branch_prefix, task_id))
    }

    fn branch_name(&self, task_id: &str) -> String {
        format!("{}{}", self.config.branch_prefix, task_id)
    }

    async fn create_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        base_branch: &str,
    ) -> Result<TaskWorktree> {
        let path = self.worktree_path(repo_path, task_id);
        let branch = self.branch_name(task_id);

        if path.exists() {
            return Err(VcsError::WorktreeAlreadyExists(task_id.to_string()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.run_git(
            &["worktree", "add", "-b", &branch, Self::path_arg(&path)?, base_branch],
            repo_path,
        )
        .await?;

        info!(task_id, path = %path.display(), branch = %branch, "Created task worktree");
        Ok(TaskWorktree::new(task_id, path, branch))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Err(VcsError::WorktreeNotFound(path.display().to_string()));
        }

        let status = self.run_git(&["status", "--porcelain"], path).await?;
        Ok(!status.trim().is_empty())
    }

    async fn commit_wip(&self, path: &Path, task_id: &str) -> Result<Option<String>> {
        if !self.has_uncommitted_changes(path).await? {
            debug!(task_id, path = %path.display(), "Nothing to preserve");
            return Ok(None);
        }

        let author_name = format!("user.name={}", self.config.wip_author_name);
        let author_email = format!("user.email={}", self.config.wip_author_email);
        let message = self.wip_message(task_id);

        self.run_git(&["add", "-A"], path).await?;
        self.run_git(
            &[
                "-c",
                &author_name,
                "-c",
                &author_email,
                "commit",
                "--no-verify",
                "-m",
                &message,
            ],
            path,
        )
        .await?;

        let sha = self.run_git(&["rev-parse", "HEAD"], path).await?;
        let sha = sha.trim().to_string();
        info!(task_id, commit = %sha, "Committed work in progress");
        Ok(Some(sha))
    }

    async fn remove_task_worktree(
        &self,
        repo_path: &Path,
        task_id: &str,
        known_path: Option<&Path>,
    ) -> Result<bool> {
        let path = known_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.worktree_path(repo_path, task_id));

        if !path.exists() {
            self.prune(repo_path).await;
            return Ok(false);
        }

        let removed = self
            .run_git(
                &["worktree", "remove", "--force", Self::path_arg(&path)?],
                repo_path,
            )
            .await;

        if let Err(e) = removed {
            warn!(task_id, path = %path.display(), error = %e, "git worktree remove failed, deleting directory");
            if path.exists() {
                tokio::fs::remove_dir_all(&path).await?;
            }
            self.prune(repo_path).await;
        }

        info!(task_id, path = %path.display(), "Removed task worktree");
        Ok(true)
    }

    async fn list_task_worktrees(&self, repo_path: &Path) -> Result<Vec<TaskWorktree>> {
        let output = self
            .run_git(&["worktree", "list", "--porcelain"], repo_path)
            .await?;

        Ok(self.parse_worktree_list(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git_cmd(dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn create_temp_git_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("demo");
        std::fs::create_dir_all(&repo).unwrap();

        git_cmd(&repo, &["init", "--initial-branch=main"]);
        git_cmd(&repo, &["config", "user.email", "test@test.com"]);
        git_cmd(&repo, &["config", "user.name", "Test"]);
        std::fs::write(repo.join("README.md"), "# Test").unwrap();
        git_cmd(&repo, &["add", "."]);
        git_cmd(&repo, &["commit", "-m", "Initial commit"]);

        (temp_dir, repo)
    }

    #[test]
    fn test_worktree_path_and_branch() {
        let git = GitWorktrees::default();
        let repo = Path::new("/work/demo");

        assert_eq!(
            git.worktree_path(repo, "bd-7"),
            PathBuf::from("/work/.workspaces/demo/task-bd-7")
        );
        assert_eq!(git.branch_name("bd-7"), "task-bd-7");
    }

    #[test]
    fn test_parse_worktree_list_keeps_task_branches_only() {
        let git = GitWorktrees::default();
        let output = "worktree /work/demo\nHEAD abc\nbranch refs/heads/main\n\n\
                      worktree /work/.workspaces/demo/task-bd-1\nHEAD def\nbranch refs/heads/task-bd-1\n\n\
                      worktree /work/.workspaces/demo/detached\nHEAD 123\ndetached\n";

        let worktrees = git.parse_worktree_list(output);
        assert_eq!(worktrees.len(), 1);
        assert_eq!(worktrees[0].task_id, "bd-1");
        assert_eq!(worktrees[0].branch_name, "task-bd-1");
    }

    #[tokio::test]
    async fn test_create_and_list_task_worktree() {
        let (_tmp, repo) = create_temp_git_repo();
        let git = GitWorktrees::default();

        let wt = git.create_task_worktree(&repo, "bd-1", "main").await.unwrap();
        assert!(wt.path.exists());
        assert_eq!(wt.branch_name, "task-bd-1");

        let listed = git.list_task_worktrees(&repo).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, "bd-1");

        let err = git.create_task_worktree(&repo, "bd-1", "main").await.unwrap_err();
        assert!(matches!(err, VcsError::WorktreeAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_commit_wip_preserves_changes() {
        let (_tmp, repo) = create_temp_git_repo();
        let git = GitWorktrees::default();
        let wt = git.create_task_worktree(&repo, "bd-2", "main").await.unwrap();

        assert_eq!(git.commit_wip(&wt.path, "bd-2").await.unwrap(), None);

        std::fs::write(wt.path.join("notes.txt"), "half done").unwrap();
        assert!(git.has_uncommitted_changes(&wt.path).await.unwrap());

        let sha = git.commit_wip(&wt.path, "bd-2").await.unwrap().unwrap();
        assert!(!git.has_uncommitted_changes(&wt.path).await.unwrap());

        let subject = git_cmd(&wt.path, &["log", "-1", "--format=%s"]);
        assert!(subject.starts_with("WIP:"));
        assert!(subject.contains("bd-2"));
        let head = git_cmd(&wt.path, &["rev-parse", "HEAD"]);
        assert_eq!(head.trim(), sha);
    }

    #[tokio::test]
    async fn test_commit_wip_missing_path() {
        let git = GitWorktrees::default();
        let err = git
            .commit_wip(Path::new("/nonexistent/worktree"), "bd-3")
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::WorktreeNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_task_worktree_keeps_branch() {
        let (_tmp, repo) = create_temp_git_repo();
        let git = GitWorktrees::default();
        let wt = git.create_task_worktree(&repo, "bd-4", "main").await.unwrap();
        std::fs::write(wt.path.join("dirty.txt"), "x").unwrap();

        assert!(git.remove_task_worktree(&repo, "bd-4", None).await.unwrap());
        assert!(!wt.path.exists());
        assert!(git.list_task_worktrees(&repo).await.unwrap().is_empty());

        let branches = git_cmd(&repo, &["branch", "--list", "task-bd-4"]);
        assert!(branches.contains("task-bd-4"));

        let current = git_cmd(&repo, &["rev-parse", "--abbrev-ref", "HEAD"]);
        assert_eq!(current.trim(), "main");

        assert!(!git.remove_task_worktree(&repo, "bd-4", None).await.unwrap());
    }
}
