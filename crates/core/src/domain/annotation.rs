//! Structured annotations stored on task labels.
//!
//! Issue stores only understand flat string labels, so annotations are
//! encoded as `<tag>:<json>`. Decoding goes through serde into a closed
//! set of variants instead of ad-hoc string inspection.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const SCOPE_LABEL_PREFIX: &str = "scope:";
pub const ACTUAL_FILES_LABEL_PREFIX: &str = "actual-files:";

/// Files a task declares up front that it will touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDeclaration {
    #[serde(default)]
    pub modify: Vec<String>,
    #[serde(default)]
    pub create: Vec<String>,
}

impl ScopeDeclaration {
    /// Union of `modify` and `create`, in declaration order.
    pub fn all_files(&self) -> impl Iterator<Item = &String> {
        self.modify.iter().chain(self.create.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.modify.is_empty() && self.create.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAnnotation {
    /// Declared scope, written by whoever planned the task.
    Scope(ScopeDeclaration),
    /// Files the task actually changed, written after completion.
    ActualFiles(Vec<String>),
}

impl TaskAnnotation {
    /// Decode a label.
    ///
    /// Returns `None` when the label carries no annotation at all.
    pub fn parse(label: &str) -> Option<Result<Self>> {
        if let Some(body) = label.strip_prefix(SCOPE_LABEL_PREFIX) {
            return Some(
                serde_json::from_str::<ScopeDeclaration>(body)
                    .map(Self::Scope)
                    .map_err(|e| CoreError::MalformedAnnotation {
                        kind: "scope",
                        reason: e.to_string(),
                    }),
            );
        }

        if let Some(body) = label.strip_prefix(ACTUAL_FILES_LABEL_PREFIX) {
            return Some(
                serde_json::from_str::<Vec<String>>(body)
                    .map(Self::ActualFiles)
                    .map_err(|e| CoreError::MalformedAnnotation {
                        kind: "actual-files",
                        reason: e.to_string(),
                    }),
            );
        }

        None
    }

    pub fn to_label(&self) -> String {
        match self {
            Self::Scope(scope) => format!(
                "{}{}",
                SCOPE_LABEL_PREFIX,
                serde_json::to_string(scope).unwrap_or_else(|_| "{}".to_string())
            ),
            Self::ActualFiles(files) => format!(
                "{}{}",
                ACTUAL_FILES_LABEL_PREFIX,
                serde_json::to_string(files).unwrap_or_else(|_| "[]".to_string())
            ),
        }
    }

    pub fn is_actual_files_label(label: &str) -> bool {
        label.starts_with(ACTUAL_FILES_LABEL_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_label() {
        let parsed = TaskAnnotation::parse(r#"scope:{"modify":["src/a.ts"],"create":["src/b.ts"]}"#)
            .unwrap()
            .unwrap();

        match parsed {
            TaskAnnotation::Scope(scope) => {
                assert_eq!(scope.modify, vec!["src/a.ts"]);
                assert_eq!(scope.create, vec!["src/b.ts"]);
                assert_eq!(scope.all_files().count(), 2);
            }
            other => panic!("Expected Scope, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_scope_label_with_missing_lists() {
        let parsed = TaskAnnotation::parse(r#"scope:{"create":["lib/new.rs"]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            parsed,
            TaskAnnotation::Scope(ScopeDeclaration {
                modify: vec![],
                create: vec!["lib/new.rs".to_string()],
            })
        );
    }

    #[test]
    fn test_parse_actual_files_label() {
        let parsed = TaskAnnotation::parse(r#"actual-files:["src/models/user.ts"]"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            parsed,
            TaskAnnotation::ActualFiles(vec!["src/models/user.ts".to_string()])
        );
    }

    #[test]
    fn test_malformed_annotation_is_error() {
        let parsed = TaskAnnotation::parse("scope:{modify: src}").unwrap();
        assert!(matches!(
            parsed,
            Err(CoreError::MalformedAnnotation { kind: "scope", .. })
        ));
    }

    #[test]
    fn test_plain_label_is_not_an_annotation() {
        assert!(TaskAnnotation::parse("backend").is_none());
        assert!(TaskAnnotation::parse("scoped").is_none());
    }

    #[test]
    fn test_label_encoding_matches_parser() {
        let annotation = TaskAnnotation::ActualFiles(vec!["a.rs".into(), "b/c.rs".into()]);
        let label = annotation.to_label();
        assert_eq!(label, r#"actual-files:["a.rs","b/c.rs"]"#);
        assert!(TaskAnnotation::is_actual_files_label(&label));
        assert_eq!(TaskAnnotation::parse(&label).unwrap().unwrap(), annotation);
    }
}
