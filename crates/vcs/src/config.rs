use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_WORKSPACES_DIR: &str = ".workspaces";

/// Where per-task checkouts live and how their branches are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Root for task checkouts. When unset, checkouts go to
    /// `<repo parent>/.workspaces/<repo name>`.
    pub base_dir: Option<PathBuf>,
    pub branch_prefix: String,
    /// Subject prefix for commits that preserve abandoned work.
    pub wip_commit_prefix: String,
    pub wip_author_name: String,
    pub wip_author_email: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            branch_prefix: "task-".to_string(),
            wip_commit_prefix: "WIP".to_string(),
            wip_author_name: "swarmyard".to_string(),
            wip_author_email: "recovery@swarmyard.local".to_string(),
        }
    }
}

impl WorktreeConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir: Some(base_dir),
            ..Default::default()
        }
    }

    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = prefix.into();
        self
    }

    pub fn base_path_for(&self, repo_path: &Path) -> PathBuf {
        if let Some(base) = &self.base_dir {
            return base.clone();
        }

        match (repo_path.parent(), repo_path.file_name()) {
            (Some(parent), Some(name)) => parent.join(DEFAULT_WORKSPACES_DIR).join(name),
            _ => repo_path.join(DEFAULT_WORKSPACES_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_is_sibling_of_repo() {
        let config = WorktreeConfig::default();
        assert_eq!(
            config.base_path_for(Path::new("/work/demo")),
            PathBuf::from("/work/.workspaces/demo")
        );
    }

    #[test]
    fn test_explicit_base_wins() {
        let config = WorktreeConfig::new(PathBuf::from("/custom/path")).with_branch_prefix("swarm/");
        assert_eq!(
            config.base_path_for(Path::new("/work/demo")),
            PathBuf::from("/custom/path")
        );
        assert_eq!(config.branch_prefix, "swarm/");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: WorktreeConfig =
            serde_json::from_str(r#"{ "branch_prefix": "agent/" }"#).unwrap();
        assert_eq!(config.branch_prefix, "agent/");
        assert_eq!(config.wip_commit_prefix, "WIP");
        assert!(config.base_dir.is_none());
    }
}
