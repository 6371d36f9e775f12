//! SQLite-backed implementations of the collaborator traits.

use async_trait::async_trait;
use db::{ProjectRepository, TaskRepository};
use std::path::Path;
use swarmyard_core::{GitWorkingMode, Task, UpdateTaskRequest, AGENT_ASSIGNEE_PREFIX};

use crate::audit::normalize_repo_path;
use crate::error::{OrchestratorError, Result};
use crate::traits::{IssueStore, ProjectRegistry, ProjectSettings, RecoveryTarget};

#[async_trait]
impl IssueStore for TaskRepository {
    async fn show(&self, project_id: &str, task_id: &str) -> Result<Option<Task>> {
        Ok(self.find_by_id(project_id, task_id).await?)
    }

    async fn get_blockers(&self, project_id: &str, task_id: &str) -> Result<Vec<String>> {
        Ok(self.blockers(project_id, task_id).await?)
    }

    async fn add_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()> {
        Ok(TaskRepository::add_label(self, project_id, task_id, label).await?)
    }

    async fn remove_label(&self, project_id: &str, task_id: &str, label: &str) -> Result<()> {
        TaskRepository::remove_label(self, project_id, task_id, label).await?;
        Ok(())
    }

    async fn update(
        &self,
        project_id: &str,
        task_id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<()> {
        match TaskRepository::update(self, project_id, task_id, update).await? {
            Some(_) => Ok(()),
            None => Err(OrchestratorError::task_not_found(project_id, task_id)),
        }
    }

    async fn list_in_progress_with_agent_assignee(&self, project_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .find_in_progress_by_assignee_prefix(project_id, AGENT_ASSIGNEE_PREFIX)
            .await?)
    }
}

#[async_trait]
impl ProjectRegistry for ProjectRepository {
    async fn project_id_for_repo(&self, repo_path: &Path) -> Result<Option<String>> {
        let key = normalize_repo_path(repo_path);
        let key = key.to_string_lossy();
        Ok(self.find_by_repo_path(&key).await?.map(|p| p.id))
    }

    async fn active_targets(&self) -> Result<Vec<RecoveryTarget>> {
        Ok(self
            .find_active()
            .await?
            .into_iter()
            .map(|p| RecoveryTarget::new(p.id, p.repo_path))
            .collect())
    }
}

#[async_trait]
impl ProjectSettings for ProjectRepository {
    async fn git_working_mode(&self, project_id: &str) -> Result<GitWorkingMode> {
        match self.working_mode(project_id).await {
            Ok(mode) => Ok(mode),
            Err(db::DbError::ProjectNotFound(id)) => Err(OrchestratorError::ProjectNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}
