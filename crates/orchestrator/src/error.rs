use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Task not found: {project_id}/{task_id}")]
    TaskNotFound { project_id: String, task_id: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Issue store error: {0}")]
    Store(String),

    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Domain error: {0}")]
    Core(#[from] swarmyard_core::CoreError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Working tree error: {0}")]
    Vcs(#[from] vcs::VcsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn task_not_found(project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            project_id: project_id.into(),
            task_id: task_id.into(),
        }
    }

    pub fn store(reason: impl std::fmt::Display) -> Self {
        Self::Store(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = OrchestratorError::task_not_found("proj", "bd-1");
        assert_eq!(err.to_string(), "Task not found: proj/bd-1");

        let err = OrchestratorError::InvalidTimestamp {
            value: "yesterday".to_string(),
            reason: "bad".to_string(),
        };
        assert!(err.to_string().contains("\"yesterday\""));
    }

    #[test]
    fn test_from_lower_layers() {
        let err: OrchestratorError = db::DbError::ProjectNotFound("p".to_string()).into();
        assert!(matches!(err, OrchestratorError::Database(_)));

        let err: OrchestratorError = vcs::VcsError::WorktreeNotFound("w".to_string()).into();
        assert!(matches!(err, OrchestratorError::Vcs(_)));
    }
}
