//! Append-only record of orchestrator decisions, scoped per project.
//!
//! Writes are best-effort: a failed append is logged and dropped so that
//! auditing never blocks the dispatcher. Reads surface their errors.

use chrono::{DateTime, Utc};
use db::EventRepository;
use events::EventBus;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use swarmyard_core::{NewOrchestratorEvent, OrchestratorEvent};
use tracing::{debug, warn};

use crate::best_effort::BestEffort;
use crate::error::{OrchestratorError, Result};
use crate::traits::ProjectRegistry;

/// Lexically cleaned form of a repository path.
///
/// Drops trailing separators and `.` components and folds `..` into its
/// parent, so every spelling of one directory maps to one project. The
/// filesystem is not consulted.
pub fn normalize_repo_path(repo_path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in repo_path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Identifier for a repository that is not registered as a project.
///
/// Derived from the cleaned path alone so it stays stable across runs.
pub fn fallback_project_id(repo_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_repo_path(repo_path).to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    format!("repo-{}", hex::encode(&hash[..8]))
}

#[derive(Clone)]
pub struct AuditLog {
    events: EventRepository,
    registry: Arc<dyn ProjectRegistry>,
    bus: Option<EventBus>,
}

impl AuditLog {
    pub fn new(events: EventRepository, registry: Arc<dyn ProjectRegistry>) -> Self {
        Self {
            events,
            registry,
            bus: None,
        }
    }

    /// Publish every appended event on `bus` as well.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Registered project id for `repo_path`, or the path-derived fallback.
    pub async fn project_id_for(&self, repo_path: &Path) -> Result<String> {
        let repo_path = normalize_repo_path(repo_path);
        Ok(self
            .registry
            .project_id_for_repo(&repo_path)
            .await?
            .unwrap_or_else(|| fallback_project_id(&repo_path)))
    }

    /// Append an event. Never fails; returns the stored event on success.
    pub async fn append(
        &self,
        repo_path: &Path,
        event: NewOrchestratorEvent,
    ) -> Option<OrchestratorEvent> {
        let repo_path = normalize_repo_path(repo_path);
        let project_id = match self.registry.project_id_for_repo(&repo_path).await {
            Ok(Some(id)) => id,
            Ok(None) => fallback_project_id(&repo_path),
            Err(e) => {
                warn!(repo = %repo_path.display(), error = %e, "Project lookup failed, using path hash");
                fallback_project_id(&repo_path)
            }
        };

        let stored = self
            .events
            .append(&project_id, &event)
            .await
            .log_discard("audit append")?;

        debug!(
            project_id = %stored.project_id,
            task_id = %stored.task_id,
            event = %stored.event,
            seq = stored.seq,
            "Audit event appended"
        );

        if let Some(bus) = &self.bus {
            bus.publish(stored.clone());
        }
        Some(stored)
    }

    /// Events at or after `since` (RFC 3339), in insertion order.
    pub async fn read_since(&self, repo_path: &Path, since: &str) -> Result<Vec<OrchestratorEvent>> {
        let since = parse_timestamp(since)?;
        let project_id = self.project_id_for(repo_path).await?;
        Ok(self.events.find_since(&project_id, since).await?)
    }

    pub async fn read_for_task(
        &self,
        repo_path: &Path,
        task_id: &str,
    ) -> Result<Vec<OrchestratorEvent>> {
        let project_id = self.project_id_for(repo_path).await?;
        Ok(self.events.find_by_task(&project_id, task_id).await?)
    }

    /// The `count` most recent events, oldest first.
    pub async fn read_recent(&self, repo_path: &Path, count: u32) -> Result<Vec<OrchestratorEvent>> {
        let project_id = self.project_id_for(repo_path).await?;
        Ok(self.events.find_recent(&project_id, count).await?)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sqlite_pool, StaticRegistry};
    use chrono::TimeZone;
    use events::EventKind;

    async fn audit_log(registry: StaticRegistry) -> (AuditLog, tempfile::TempDir) {
        let (pool, dir) = sqlite_pool().await;
        (
            AuditLog::new(EventRepository::new(pool), Arc::new(registry)),
            dir,
        )
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, secs).unwrap()
    }

    #[test]
    fn test_fallback_project_id_is_stable() {
        let a = fallback_project_id(Path::new("/work/demo"));
        let b = fallback_project_id(Path::new("/work/demo"));
        let c = fallback_project_id(Path::new("/work/other"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("repo-"));
        assert_eq!(a.len(), "repo-".len() + 16);
    }

    #[test]
    fn test_normalize_repo_path() {
        let expected = Path::new("/work/demo");
        for raw in ["/work/demo", "/work/demo/", "/work/./demo", "/work/x/../demo//"] {
            assert_eq!(normalize_repo_path(Path::new(raw)), expected, "{raw}");
        }
        assert_eq!(normalize_repo_path(Path::new("./")), Path::new("."));
        assert_eq!(normalize_repo_path(Path::new("../up")), Path::new("../up"));

        assert_eq!(
            fallback_project_id(Path::new("/tmp/x")),
            fallback_project_id(Path::new("/tmp/x/"))
        );
    }

    #[tokio::test]
    async fn test_path_spellings_share_one_project() {
        let (pool, _dir) = sqlite_pool().await;
        let projects = db::ProjectRepository::new(pool.clone());
        projects
            .create(&swarmyard_core::Project::new("p1", "demo", "/work/demo"))
            .await
            .unwrap();
        let log = AuditLog::new(EventRepository::new(pool), Arc::new(projects));

        for repo in ["/work/demo", "/work/demo/", "/work/./demo"] {
            let stored = log
                .append(Path::new(repo), NewOrchestratorEvent::new("bd-1", "task.started"))
                .await
                .unwrap();
            assert_eq!(stored.project_id, "p1", "{repo}");
        }

        let events = log.read_for_task(Path::new("/work/demo/"), "bd-1").await.unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let (pool, _dir) = sqlite_pool().await;
        let log = AuditLog::new(EventRepository::new(pool.clone()), Arc::new(StaticRegistry::new()));
        pool.close().await;

        let stored = log
            .append(Path::new("/work/demo"), NewOrchestratorEvent::new("bd-1", "task.started"))
            .await;
        assert!(stored.is_none());
        assert!(log.read_for_task(Path::new("/work/demo"), "bd-1").await.is_err());
    }

    #[tokio::test]
    async fn test_append_uses_registered_project() {
        let registry = StaticRegistry::new().with_project("proj-1", "/work/demo");
        let (log, _dir) = audit_log(registry).await;

        let stored = log
            .append(Path::new("/work/demo"), NewOrchestratorEvent::new("bd-1", "task.started"))
            .await
            .unwrap();
        assert_eq!(stored.project_id, "proj-1");
    }

    #[tokio::test]
    async fn test_unregistered_repo_gets_hashed_id() {
        let (log, _dir) = audit_log(StaticRegistry::new()).await;
        let repo = Path::new("/tmp/orphan");

        let stored = log
            .append(repo, NewOrchestratorEvent::new("bd-1", "task.started"))
            .await
            .unwrap();
        assert_eq!(stored.project_id, fallback_project_id(repo));

        let events = log.read_for_task(repo, "bd-1").await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_failure_still_appends() {
        let (log, _dir) = audit_log(StaticRegistry::new().failing()).await;
        let repo = Path::new("/work/demo");

        let stored = log
            .append(repo, NewOrchestratorEvent::new("bd-1", "task.started"))
            .await;
        assert_eq!(stored.unwrap().project_id, fallback_project_id(repo));

        assert!(log.read_for_task(repo, "bd-1").await.is_err());
    }

    #[tokio::test]
    async fn test_read_for_task_returns_all_in_order() {
        let (log, _dir) = audit_log(StaticRegistry::new()).await;
        let repo = Path::new("/work/demo");

        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            log.append(repo, NewOrchestratorEvent::new("bd-1", *name).at(at(i as u32)))
                .await
                .unwrap();
        }
        log.append(repo, NewOrchestratorEvent::new("bd-2", "other"))
            .await
            .unwrap();

        let names: Vec<_> = log
            .read_for_task(repo, "bd-1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_read_since_and_recent() {
        let (log, _dir) = audit_log(StaticRegistry::new()).await;
        let repo = Path::new("/work/demo");

        for secs in 0..6 {
            log.append(
                repo,
                NewOrchestratorEvent::new("bd-1", format!("e{secs}")).at(at(secs)),
            )
            .await
            .unwrap();
        }

        let since = log
            .read_since(repo, "2026-03-01T09:00:04.000Z")
            .await
            .unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].event, "e4");

        let offset = log.read_since(repo, "2026-03-01T11:00:03+02:00").await.unwrap();
        assert_eq!(offset.len(), 3);

        let recent = log.read_recent(repo, 2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["e4", "e5"]);

        let err = log.read_since(repo, "last tuesday").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTimestamp { .. }));
    }

    #[tokio::test]
    async fn test_append_publishes_on_bus() {
        let (log, _dir) = audit_log(StaticRegistry::new()).await;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let log = log.with_bus(bus);

        log.append(
            Path::new("/work/demo"),
            NewOrchestratorEvent::new("bd-1", EventKind::TaskRecovered.as_str()),
        )
        .await
        .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind(), Some(EventKind::TaskRecovered));
        assert_eq!(envelope.task_id(), "bd-1");
    }
}
