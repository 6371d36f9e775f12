//! Predicts which files and directories a task will touch before it runs.
//!
//! Resolution order, first non-empty result wins:
//! 1. `explicit`: a `scope:` annotation on the task itself.
//! 2. `inferred`: `actual-files:` annotations recorded on the task's direct blockers.
//! 3. `heuristic`: path-like tokens found in the title and description.
//!
//! Predictions are advisory. The dispatcher uses [`overlaps`] to avoid
//! scheduling two tasks that would edit the same code concurrently.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use swarmyard_core::{FileScope, ScopeConfidence, Task, TaskAnnotation};
use tracing::{debug, warn};

use crate::best_effort::BestEffort;
use crate::traits::IssueStore;

/// Top-level directory names that mark a token as a source path.
const SOURCE_ROOTS: &[&str] = &[
    "packages",
    "components",
    "services",
    "modules",
    "internal",
    "server",
    "client",
    "crates",
    "pages",
    "tests",
    "test",
    "apps",
    "app",
    "src",
    "lib",
    "api",
    "pkg",
    "cmd",
];

static PATH_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();

fn path_token_regex() -> Option<&'static Regex> {
    PATH_TOKEN
        .get_or_init(|| {
            let pattern = format!(
                r#"(?:^|[\s"'`(\[{{<,;]|\./)((?:{})(?:/[A-Za-z0-9_.\-]+)*)"#,
                SOURCE_ROOTS.join("|")
            );
            Regex::new(&pattern).ok()
        })
        .as_ref()
}

/// Stateless predictor; all inputs come through the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopePredictor;

impl ScopePredictor {
    pub fn new() -> Self {
        Self
    }

    /// Estimate the scope of `task`.
    ///
    /// With `lookup`, blockers are resolved from `task.depends_on` and the
    /// table only; without it, they are fetched from `store` one at a time.
    /// Store failures are logged and degrade the result to the next tier.
    pub async fn predict(
        &self,
        project_id: &str,
        repo_path: &Path,
        task: &Task,
        store: &dyn IssueStore,
        lookup: Option<&HashMap<String, Task>>,
    ) -> FileScope {
        if let Some(scope) = explicit_scope(repo_path, task) {
            return scope;
        }

        let inherited = match lookup {
            Some(table) => inherited_from_table(repo_path, task, table),
            None => inherited_from_store(project_id, repo_path, task, store).await,
        };
        if !inherited.is_empty() {
            debug!(task_id = %task.id, files = inherited.len(), "Inferred scope from blockers");
            return FileScope::from_files(&task.id, inherited, ScopeConfidence::Inferred);
        }

        heuristic_scope(task)
    }

    /// Record the files a finished task actually changed so dependants can
    /// infer their scope from it. Replaces any earlier record.
    ///
    /// Returns whether a record was written. An empty list is a no-op.
    pub async fn record_actual(
        &self,
        project_id: &str,
        repo_path: &Path,
        task_id: &str,
        changed_files: &[String],
        store: &dyn IssueStore,
    ) -> bool {
        let files: BTreeSet<String> = changed_files
            .iter()
            .filter_map(|f| normalize_path(repo_path, f))
            .collect();
        if files.is_empty() {
            return false;
        }

        let Some(Some(task)) = store
            .show(project_id, task_id)
            .await
            .log_discard("load task for actual-files record")
        else {
            warn!(task_id, "Cannot record actual files for unknown task");
            return false;
        };

        for label in task
            .labels
            .iter()
            .filter(|l| TaskAnnotation::is_actual_files_label(l))
        {
            store
                .remove_label(project_id, task_id, label)
                .await
                .log_discard("remove stale actual-files label");
        }

        let label = TaskAnnotation::ActualFiles(files.into_iter().collect()).to_label();
        store
            .add_label(project_id, task_id, &label)
            .await
            .log_discard("write actual-files label")
            .is_some()
    }

    pub fn overlaps(&self, a: &FileScope, b: &FileScope) -> bool {
        overlaps(a, b)
    }
}

/// Whether two scopes conflict.
///
/// Shared files always conflict. Directory relationships only count when at
/// least one side is heuristic. Two empty scopes never conflict.
pub fn overlaps(a: &FileScope, b: &FileScope) -> bool {
    if a.files.intersection(&b.files).next().is_some() {
        return true;
    }

    let heuristic =
        a.confidence == ScopeConfidence::Heuristic || b.confidence == ScopeConfidence::Heuristic;
    if !heuristic {
        return false;
    }

    a.directories
        .iter()
        .any(|da| b.directories.iter().any(|db| dirs_related(da, db)))
}

fn dirs_related(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}

fn is_ancestor(parent: &str, child: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && child.as_bytes()[parent.len()] == b'/'
}

fn explicit_scope(repo_path: &Path, task: &Task) -> Option<FileScope> {
    for annotation in task.annotations() {
        match annotation {
            Ok(TaskAnnotation::Scope(declared)) => {
                let files: BTreeSet<String> = declared
                    .all_files()
                    .filter_map(|f| normalize_path(repo_path, f))
                    .collect();
                if !files.is_empty() {
                    return Some(FileScope::from_files(
                        &task.id,
                        files,
                        ScopeConfidence::Explicit,
                    ));
                }
            }
            Ok(TaskAnnotation::ActualFiles(_)) => {}
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Ignoring unreadable task annotation");
            }
        }
    }
    None
}

fn actual_files(repo_path: &Path, task: &Task, into: &mut BTreeSet<String>) {
    for annotation in task.annotations() {
        match annotation {
            Ok(TaskAnnotation::ActualFiles(files)) => {
                into.extend(files.iter().filter_map(|f| normalize_path(repo_path, f)));
            }
            Ok(TaskAnnotation::Scope(_)) => {}
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Ignoring unreadable task annotation");
            }
        }
    }
}

fn inherited_from_table(
    repo_path: &Path,
    task: &Task,
    table: &HashMap<String, Task>,
) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    for dep in task.depends_on.iter().filter_map(|id| table.get(id)) {
        actual_files(repo_path, dep, &mut files);
    }
    files
}

async fn inherited_from_store(
    project_id: &str,
    repo_path: &Path,
    task: &Task,
    store: &dyn IssueStore,
) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    let Some(blockers) = store
        .get_blockers(project_id, &task.id)
        .await
        .log_discard("list blockers")
    else {
        return files;
    };

    for blocker_id in blockers {
        if let Some(Some(dep)) = store
            .show(project_id, &blocker_id)
            .await
            .log_discard("load blocker")
        {
            actual_files(repo_path, &dep, &mut files);
        }
    }
    files
}

fn heuristic_scope(task: &Task) -> FileScope {
    let text = format!("{}\n{}", task.title, task.description);
    FileScope::from_directories(&task.id, mentioned_directories(&text), ScopeConfidence::Heuristic)
}

/// Directories named by path-like tokens in free text.
fn mentioned_directories(text: &str) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    let Some(re) = path_token_regex() else {
        return dirs;
    };

    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };

        // The vocabulary word must end at a token boundary: `srcfoo` or `lib-x` is not a path.
        let next = text[m.end()..].chars().next();
        if next.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            continue;
        }

        let token = m.as_str().trim_end_matches('.');
        let dir = match token.rsplit_once('/') {
            Some((parent, last)) if looks_like_file(last) => parent,
            _ => token,
        };
        if !dir.is_empty() {
            dirs.insert(dir.to_string());
        }
    }
    dirs
}

fn looks_like_file(segment: &str) -> bool {
    match segment.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Repo-relative, forward-slash form of a path, or `None` when nothing is left.
pub fn normalize_path(repo_path: &Path, raw: &str) -> Option<String> {
    let mut path = raw.trim().replace('\\', "/");

    let root = repo_path.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');
    if !root.is_empty() {
        if let Some(rest) = path.strip_prefix(root) {
            if rest.is_empty() || rest.starts_with('/') {
                path = rest.trim_start_matches('/').to_string();
            }
        }
    }

    let mut rel = path.as_str();
    while let Some(rest) = rel.strip_prefix("./") {
        rel = rest;
    }
    let rel = rel.trim_end_matches('/');

    if rel.is_empty() || rel == "." {
        None
    } else {
        Some(rel.to_string())
    }
}
