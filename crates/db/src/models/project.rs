use std::path::PathBuf;
use swarmyard_core::{GitWorkingMode, Project};

use super::{datetime_to_timestamp, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub repo_path: String,
    pub git_working_mode: String,
    pub archived: bool,
    pub created_at: i64,
}

impl ProjectRow {
    pub fn into_domain(self) -> Project {
        Project {
            id: self.id,
            name: self.name,
            repo_path: PathBuf::from(self.repo_path),
            git_working_mode: GitWorkingMode::parse(&self.git_working_mode).unwrap_or_default(),
            archived: self.archived,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            repo_path: project.repo_path.to_string_lossy().into_owned(),
            git_working_mode: project.git_working_mode.as_str().to_string(),
            archived: project.archived,
            created_at: datetime_to_timestamp(project.created_at),
        }
    }
}
