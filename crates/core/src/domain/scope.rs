use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much a predicted scope can be trusted, strongest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScopeConfidence {
    Explicit,
    Inferred,
    Heuristic,
}

impl ScopeConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Inferred => "inferred",
            Self::Heuristic => "heuristic",
        }
    }
}

impl std::fmt::Display for ScopeConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted set of paths a task will touch. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileScope {
    pub task_id: String,
    pub files: BTreeSet<String>,
    /// Always holds the parent of every entry in `files`.
    pub directories: BTreeSet<String>,
    pub confidence: ScopeConfidence,
}

impl FileScope {
    /// Scope with no files and no directories.
    pub fn empty(task_id: impl Into<String>, confidence: ScopeConfidence) -> Self {
        Self {
            task_id: task_id.into(),
            files: BTreeSet::new(),
            directories: BTreeSet::new(),
            confidence,
        }
    }

    /// Build a scope from repo-relative file paths, deriving their parent directories.
    pub fn from_files<I, S>(task_id: impl Into<String>, files: I, confidence: ScopeConfidence) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files: BTreeSet<String> = files.into_iter().map(Into::into).collect();
        let directories = files.iter().map(|f| parent_dir(f).to_string()).collect();
        Self {
            task_id: task_id.into(),
            files,
            directories,
            confidence,
        }
    }

    /// Build a directory-only scope.
    pub fn from_directories<I, S>(
        task_id: impl Into<String>,
        directories: I,
        confidence: ScopeConfidence,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_id: task_id.into(),
            files: BTreeSet::new(),
            directories: directories.into_iter().map(Into::into).collect(),
            confidence,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// Parent directory of a repo-relative path; `.` for top-level entries.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ".",
        Some(idx) => &path[..idx],
    }
}
