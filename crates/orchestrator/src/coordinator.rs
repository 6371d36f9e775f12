//! Join barrier for the test and review results of one task attempt.
//!
//! Tests and review run concurrently once coding succeeds. Whichever
//! finishes second triggers resolution; the `resolved` flag is claimed with a
//! compare-and-swap before the resolver runs, so resolution happens exactly
//! once no matter how the two setters interleave.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use swarmyard_core::{NewOrchestratorEvent, ReviewOutcome, TestOutcome, Verdict};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::audit::AuditLog;
use crate::error::Result;

pub type ResolveFn =
    Box<dyn Fn(TestOutcome, ReviewOutcome) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Default)]
struct Slots {
    test: Option<TestOutcome>,
    review: Option<ReviewOutcome>,
}

pub struct PhaseOutcomeCoordinator {
    task_id: String,
    slots: Mutex<Slots>,
    resolved: AtomicBool,
    resolver: ResolveFn,
    done: watch::Sender<bool>,
    audit: Option<(AuditLog, PathBuf)>,
}

impl PhaseOutcomeCoordinator {
    pub fn new<F>(task_id: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(TestOutcome, ReviewOutcome) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let (done, _) = watch::channel(false);
        Self {
            task_id: task_id.into(),
            slots: Mutex::new(Slots::default()),
            resolved: AtomicBool::new(false),
            resolver: Box::new(resolve),
            done,
            audit: None,
        }
    }

    /// Record an `outcome.resolved` event for `repo_path` after resolving.
    pub fn with_audit(mut self, audit: AuditLog, repo_path: impl Into<PathBuf>) -> Self {
        self.audit = Some((audit, repo_path.into()));
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Completes once the resolver has returned, successfully or not.
    pub async fn wait_resolved(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn set_test_outcome(&self, outcome: TestOutcome) {
        let ready = self.store(|slots| {
            if slots.test.is_some() {
                debug!(task_id = %self.task_id, "Duplicate test outcome ignored");
            } else {
                slots.test = Some(outcome);
            }
        });
        if let Some((test, review)) = ready {
            self.resolve(test, review).await;
        }
    }

    pub async fn set_review_outcome(&self, outcome: ReviewOutcome) {
        let ready = self.store(|slots| {
            if slots.review.is_some() {
                debug!(task_id = %self.task_id, "Duplicate review outcome ignored");
            } else {
                slots.review = Some(outcome);
            }
        });
        if let Some((test, review)) = ready {
            self.resolve(test, review).await;
        }
    }

    /// Apply `write` to the slots and, if both are now filled, claim the
    /// resolution and hand back the pair.
    fn store(&self, write: impl FnOnce(&mut Slots)) -> Option<(TestOutcome, ReviewOutcome)> {
        if self.is_resolved() {
            debug!(task_id = %self.task_id, "Outcome arrived after resolution, ignoring");
            return None;
        }

        let mut slots = self.slots.lock().unwrap();
        write(&mut slots);

        if slots.test.is_none() || slots.review.is_none() {
            return None;
        }
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        Some((slots.test.take()?, slots.review.take()?))
    }

    async fn resolve(&self, test: TestOutcome, review: ReviewOutcome) {
        let verdict = Verdict::from_outcomes(&test, &review);
        info!(task_id = %self.task_id, verdict = verdict.as_str(), "Resolving phase outcomes");

        let audit_data = json!({
            "verdict": verdict.as_str(),
            "test": test.status,
            "review": review.status,
        });

        let outcome = AssertUnwindSafe((self.resolver)(test, review))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task_id = %self.task_id, error = %e, "Outcome resolver failed"),
            Err(_) => error!(task_id = %self.task_id, "Outcome resolver panicked"),
        }

        if let Some((audit, repo_path)) = &self.audit {
            audit
                .append(
                    repo_path,
                    NewOrchestratorEvent::new(&self.task_id, events::OUTCOME_RESOLVED)
                        .with_data(audit_data),
                )
                .await;
        }

        self.done.send_replace(true);
    }
}
