use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a project isolates concurrent workers on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GitWorkingMode {
    /// One checkout directory per task.
    #[default]
    Worktree,
    /// A single shared checkout; tasks live on branches.
    Branches,
}

impl GitWorkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worktree => "worktree",
            Self::Branches => "branches",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "worktree" => Some(Self::Worktree),
            "branches" => Some(Self::Branches),
            _ => None,
        }
    }
}

impl std::fmt::Display for GitWorkingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GitWorkingMode {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::CoreError::UnknownVariant {
            kind: "git working mode",
            value: s.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_path: PathBuf,
    pub git_working_mode: GitWorkingMode,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            repo_path: repo_path.into(),
            git_working_mode: GitWorkingMode::default(),
            archived: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_mode(mut self, mode: GitWorkingMode) -> Self {
        self.git_working_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("worktree".parse::<GitWorkingMode>().unwrap(), GitWorkingMode::Worktree);
        assert_eq!("branches".parse::<GitWorkingMode>().unwrap(), GitWorkingMode::Branches);
        assert!("clone".parse::<GitWorkingMode>().is_err());
    }

    #[test]
    fn test_project_defaults_to_worktree_mode() {
        let project = Project::new("p1", "demo", "/repo");
        assert_eq!(project.git_working_mode, GitWorkingMode::Worktree);
        assert!(!project.archived);
    }
}
