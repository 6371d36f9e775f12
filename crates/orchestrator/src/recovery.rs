//! Finds abandoned agent work and requeues it without losing partial progress.
//!
//! Two passes run per project:
//! - stale heartbeats: worker directories whose heartbeat has gone quiet;
//! - orphans: in-progress tasks owned by an agent that no live worker claims.
//!
//! Recovering a task commits whatever it left uncommitted, removes its
//! checkout in worktree mode, and reopens it in the issue store. Branches are
//! never checked out or switched, since other workers may share the repository.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use swarmyard_core::{GitWorkingMode, NewOrchestratorEvent, TaskStatus, UpdateTaskRequest};
use tracing::{debug, error, info};
use vcs::WorkingTreeManager;

use crate::audit::AuditLog;
use crate::best_effort::BestEffort;
use crate::error::Result;
use crate::heartbeat::HeartbeatSource;
use crate::traits::{ActiveWork, IssueStore, ProjectSettings, RecoveryTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPass {
    StaleHeartbeat,
    Orphan,
}

impl RecoveryPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaleHeartbeat => "stale_heartbeat",
            Self::Orphan => "orphan",
        }
    }
}

impl std::fmt::Display for RecoveryPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one recovered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredTask {
    pub task_id: String,
    pub wip_commit: Option<String>,
    pub worktree_removed: bool,
}

/// Task ids recovered by each pass of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale_recovered: Vec<String>,
    pub orphans_recovered: Vec<String>,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.stale_recovered.len() + self.orphans_recovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One full recovery pass over a project.
#[async_trait]
pub trait RecoverySweep: Send + Sync {
    async fn sweep(&self, target: &RecoveryTarget, activity: &dyn ActiveWork)
        -> Result<SweepReport>;
}

pub struct CrashRecovery {
    store: Arc<dyn IssueStore>,
    worktrees: Arc<dyn WorkingTreeManager>,
    heartbeats: Arc<dyn HeartbeatSource>,
    settings: Arc<dyn ProjectSettings>,
    audit: Option<AuditLog>,
}

impl CrashRecovery {
    pub fn new(
        store: Arc<dyn IssueStore>,
        worktrees: Arc<dyn WorkingTreeManager>,
        heartbeats: Arc<dyn HeartbeatSource>,
        settings: Arc<dyn ProjectSettings>,
    ) -> Self {
        Self {
            store,
            worktrees,
            heartbeats,
            settings,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Recover in-progress tasks whose worker heartbeat is stale.
    ///
    /// A stale worker directory whose task no longer exists is removed
    /// (worktree mode only) without touching the issue store.
    pub async fn recover_stale_heartbeats(
        &self,
        target: &RecoveryTarget,
        exclude: &HashSet<String>,
    ) -> Result<Vec<String>> {
        let mode = self.settings.git_working_mode(&target.project_id).await?;
        let base = self.worktrees.worktree_base_path(&target.repo_path);
        let stale = self.heartbeats.find_stale_heartbeats(&base).await?;

        let mut recovered = Vec::new();
        for heartbeat in stale {
            let task_id = heartbeat.task_id.as_str();
            if exclude.contains(task_id) {
                debug!(task_id, "Stale heartbeat belongs to active work, skipping");
                continue;
            }

            let task = match self.store.show(&target.project_id, task_id).await {
                Ok(task) => task,
                Err(e) => {
                    self.record_failure(target, task_id, RecoveryPass::StaleHeartbeat, &e)
                        .await;
                    continue;
                }
            };

            match task {
                None => {
                    if mode == GitWorkingMode::Worktree {
                        info!(task_id, dir = %heartbeat.worker_dir.display(), "Removing worker directory of unknown task");
                        self.worktrees
                            .remove_task_worktree(
                                &target.repo_path,
                                task_id,
                                Some(&heartbeat.worker_dir),
                            )
                            .await
                            .log_discard("remove worker directory of unknown task");
                    }
                }
                Some(task) if task.status != TaskStatus::InProgress => {
                    debug!(task_id, status = %task.status, "Stale heartbeat for task not in progress");
                }
                Some(_) => {
                    match self
                        .recover_task(
                            target,
                            task_id,
                            mode,
                            RecoveryPass::StaleHeartbeat,
                            Some(&heartbeat.worker_dir),
                        )
                        .await
                    {
                        Ok(done) => recovered.push(done.task_id),
                        Err(e) => {
                            self.record_failure(target, task_id, RecoveryPass::StaleHeartbeat, &e)
                                .await
                        }
                    }
                }
            }
        }

        Ok(recovered)
    }

    /// Recover in-progress, agent-assigned tasks that no live worker claims.
    pub async fn recover_orphans(
        &self,
        target: &RecoveryTarget,
        exclude: &HashSet<String>,
    ) -> Result<Vec<String>> {
        let mode = self.settings.git_working_mode(&target.project_id).await?;
        let candidates = self
            .store
            .list_in_progress_with_agent_assignee(&target.project_id)
            .await?;

        let mut recovered = Vec::new();
        for task in candidates {
            if exclude.contains(&task.id) || !task.has_agent_assignee() {
                continue;
            }

            match self
                .recover_task(target, &task.id, mode, RecoveryPass::Orphan, None)
                .await
            {
                Ok(done) => recovered.push(done.task_id),
                Err(e) => {
                    self.record_failure(target, &task.id, RecoveryPass::Orphan, &e)
                        .await
                }
            }
        }

        Ok(recovered)
    }

    /// Preserve, clean up and reopen a single task.
    pub async fn recover_task(
        &self,
        target: &RecoveryTarget,
        task_id: &str,
        mode: GitWorkingMode,
        pass: RecoveryPass,
        known_path: Option<&Path>,
    ) -> Result<RecoveredTask> {
        let path = match mode {
            GitWorkingMode::Worktree => known_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.worktrees.worktree_path(&target.repo_path, task_id)),
            GitWorkingMode::Branches => target.repo_path.clone(),
        };

        let wip_commit = if path.exists() {
            self.worktrees.commit_wip(&path, task_id).await?
        } else {
            debug!(task_id, path = %path.display(), "Working path missing, nothing to preserve");
            None
        };

        let worktree_removed = match mode {
            GitWorkingMode::Worktree => {
                self.worktrees
                    .remove_task_worktree(&target.repo_path, task_id, Some(&path))
                    .await?
            }
            GitWorkingMode::Branches => false,
        };

        self.store
            .update(&target.project_id, task_id, &UpdateTaskRequest::reopen())
            .await?;

        info!(
            project_id = %target.project_id,
            task_id,
            pass = %pass,
            wip_commit = wip_commit.as_deref().unwrap_or("-"),
            worktree_removed,
            "Recovered task"
        );

        if let Some(audit) = &self.audit {
            audit
                .append(
                    &target.repo_path,
                    NewOrchestratorEvent::new(task_id, events::TASK_RECOVERED).with_data(json!({
                        "pass": pass,
                        "wip_commit": wip_commit,
                        "worktree_removed": worktree_removed,
                    })),
                )
                .await;
        }

        Ok(RecoveredTask {
            task_id: task_id.to_string(),
            wip_commit,
            worktree_removed,
        })
    }

    async fn record_failure(
        &self,
        target: &RecoveryTarget,
        task_id: &str,
        pass: RecoveryPass,
        err: &crate::error::OrchestratorError,
    ) {
        error!(
            project_id = %target.project_id,
            task_id,
            pass = %pass,
            error = %err,
            "Task recovery failed"
        );

        if let Some(audit) = &self.audit {
            audit
                .append(
                    &target.repo_path,
                    NewOrchestratorEvent::new(task_id, events::TASK_RECOVERY_FAILED).with_data(
                        json!({
                            "pass": pass,
                            "error": err.to_string(),
                        }),
                    ),
                )
                .await;
        }
    }
}

#[async_trait]
impl RecoverySweep for CrashRecovery {
    async fn sweep(
        &self,
        target: &RecoveryTarget,
        activity: &dyn ActiveWork,
    ) -> Result<SweepReport> {
        let exclude = activity.excluded_task_ids().await?;

        // Both passes always run; the sweep fails only if both do.
        let stale = self.recover_stale_heartbeats(target, &exclude).await;
        let orphans = self.recover_orphans(target, &exclude).await;

        match (stale, orphans) {
            (Err(stale_err), Err(orphan_err)) => {
                error!(
                    project_id = %target.project_id,
                    error = %stale_err,
                    "Stale heartbeat pass failed"
                );
                Err(orphan_err)
            }
            (stale, orphans) => Ok(SweepReport {
                stale_recovered: stale.log_discard("stale heartbeat pass").unwrap_or_default(),
                orphans_recovered: orphans.log_discard("orphan pass").unwrap_or_default(),
            }),
        }
    }
}
