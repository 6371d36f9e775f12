use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::annotation::TaskAnnotation;

/// Assignees with this prefix belong to coding agents rather than humans.
pub const AGENT_ASSIGNEE_PREFIX: &str = "agent-";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work as seen through the issue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    /// Ids of tasks that must complete before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::default(),
            assignee: None,
            labels: Vec::new(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }

    pub fn has_agent_assignee(&self) -> bool {
        self.assignee
            .as_deref()
            .is_some_and(|a| a.starts_with(AGENT_ASSIGNEE_PREFIX))
    }

    /// Structured annotations carried on the task's labels.
    ///
    /// Malformed annotations are returned as errors so the caller decides
    /// whether to fall through or fail.
    pub fn annotations(&self) -> Vec<crate::Result<TaskAnnotation>> {
        self.labels
            .iter()
            .filter_map(|label| TaskAnnotation::parse(label))
            .collect()
    }
}

/// Partial update applied by the issue store.
///
/// `assignee: Some(None)` clears the assignee.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<Option<String>>,
}

impl UpdateTaskRequest {
    /// Return the task to the open pool with nobody assigned.
    pub fn reopen() -> Self {
        Self {
            status: Some(TaskStatus::Open),
            assignee: Some(None),
            ..Default::default()
        }
    }
}
