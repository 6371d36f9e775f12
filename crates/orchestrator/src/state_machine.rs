use swarmyard_core::{TaskPhase, TransitionType};
use tracing::{debug, warn};

/// Validates phase transitions for a task occupying a worker slot.
///
/// Validation only: the caller owns phase storage and commits the
/// destination phase when this returns `true`.
pub struct PhaseStateMachine;

impl PhaseStateMachine {
    pub fn validate_transition(
        task_id: &str,
        current: TaskPhase,
        transition: TransitionType,
    ) -> bool {
        if let Some(required) = transition.required_source() {
            if required != current {
                warn!(
                    task_id,
                    current = %current,
                    transition = %transition,
                    required = %required,
                    "Rejected phase transition: wrong source phase"
                );
                return false;
            }
        }

        let destination = transition.destination();
        if !Self::allowed_next(current).contains(&destination) {
            warn!(
                task_id,
                current = %current,
                transition = %transition,
                destination = %destination,
                "Rejected phase transition: destination not reachable"
            );
            return false;
        }

        debug!(task_id, from = %current, to = %destination, "Phase transition accepted");
        true
    }

    pub fn allowed_next(current: TaskPhase) -> &'static [TaskPhase] {
        match current {
            TaskPhase::Idle => &[TaskPhase::Coding],
            TaskPhase::Coding => &[TaskPhase::Review, TaskPhase::Idle],
            TaskPhase::Review => &[TaskPhase::Idle],
        }
    }

    /// Destination phase if the transition is valid.
    pub fn next_phase(
        task_id: &str,
        current: TaskPhase,
        transition: TransitionType,
    ) -> Option<TaskPhase> {
        Self::validate_transition(task_id, current, transition).then(|| transition.destination())
    }
}
