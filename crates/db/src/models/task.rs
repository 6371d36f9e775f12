use swarmyard_core::{Task, TaskStatus};

use super::{datetime_to_timestamp, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub project_id: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub assignee: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    /// Labels and dependencies live in side tables and are attached by the repository.
    pub fn into_domain(self, labels: Vec<String>, depends_on: Vec<String>) -> Task {
        Task {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status).unwrap_or_default(),
            assignee: self.assignee,
            labels,
            depends_on,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            project_id: task.project_id.clone(),
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status.as_str().to_string(),
            assignee: task.assignee.clone(),
            created_at: datetime_to_timestamp(task.created_at),
            updated_at: datetime_to_timestamp(task.updated_at),
        }
    }
}
