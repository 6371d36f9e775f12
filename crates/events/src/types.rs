use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarmyard_core::OrchestratorEvent;
use uuid::Uuid;

/// A task was reset to open by crash recovery.
pub const TASK_RECOVERED: &str = "task.recovered";
/// Recovering a single task failed; the sweep continued.
pub const TASK_RECOVERY_FAILED: &str = "task.recovery_failed";
/// A phase transition was accepted for a task.
pub const PHASE_TRANSITION: &str = "phase.transition";
/// The test and review outcomes of an attempt were joined.
pub const OUTCOME_RESOLVED: &str = "outcome.resolved";

/// Event names the engine itself emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "task.recovered")]
    TaskRecovered,
    #[serde(rename = "task.recovery_failed")]
    TaskRecoveryFailed,
    #[serde(rename = "phase.transition")]
    PhaseTransition,
    #[serde(rename = "outcome.resolved")]
    OutcomeResolved,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::TaskRecovered,
        EventKind::TaskRecoveryFailed,
        EventKind::PhaseTransition,
        EventKind::OutcomeResolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskRecovered => TASK_RECOVERED,
            Self::TaskRecoveryFailed => TASK_RECOVERY_FAILED,
            Self::PhaseTransition => PHASE_TRANSITION,
            Self::OutcomeResolved => OUTCOME_RESOLVED,
        }
    }

    /// Maps a stored event name back to a known kind. Callers may append
    /// arbitrary names, so unknown ones yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope wrapping a published audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    /// When the event reached the bus, as opposed to `event.timestamp`
    pub published_at: DateTime<Utc>,
    pub event: OrchestratorEvent,
}

impl EventEnvelope {
    pub fn new(event: OrchestratorEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            published_at: Utc::now(),
            event,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.event.event)
    }

    pub fn task_id(&self) -> &str {
        &self.event.task_id
    }

    pub fn project_id(&self) -> &str {
        &self.event.project_id
    }
}

#[cfg(test)]
pub(crate) fn sample_event(task_id: &str, name: &str) -> OrchestratorEvent {
    OrchestratorEvent {
        seq: 1,
        timestamp: Utc::now(),
        project_id: "proj-1".to_string(),
        task_id: task_id.to_string(),
        event: name.to_string(),
        data: None,
    }
}
