use serde::{Deserialize, Serialize};

/// Engine-side view of what a worker slot is doing with a task.
///
/// `Idle` means the task holds no slot; it is never written to the issue store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    #[default]
    Idle,
    Coding,
    Review,
}

impl TaskPhase {
    pub const ALL: [TaskPhase; 3] = [TaskPhase::Idle, TaskPhase::Coding, TaskPhase::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Coding => "coding",
            Self::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "coding" => Some(Self::Coding),
            "review" => Some(Self::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    StartTask,
    EnterReview,
    Complete,
    Fail,
}

impl TransitionType {
    pub const ALL: [TransitionType; 4] = [
        TransitionType::StartTask,
        TransitionType::EnterReview,
        TransitionType::Complete,
        TransitionType::Fail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartTask => "start_task",
            Self::EnterReview => "enter_review",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start_task" => Some(Self::StartTask),
            "enter_review" => Some(Self::EnterReview),
            "complete" => Some(Self::Complete),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    /// Phase the task must be in, or `None` when any phase is accepted.
    pub fn required_source(&self) -> Option<TaskPhase> {
        match self {
            Self::StartTask => Some(TaskPhase::Idle),
            Self::EnterReview => Some(TaskPhase::Coding),
            Self::Complete | Self::Fail => None,
        }
    }

    pub fn destination(&self) -> TaskPhase {
        match self {
            Self::StartTask => TaskPhase::Coding,
            Self::EnterReview => TaskPhase::Review,
            Self::Complete | Self::Fail => TaskPhase::Idle,
        }
    }
}

impl std::fmt::Display for TransitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trip_names() {
        for phase in TaskPhase::ALL {
            assert_eq!(TaskPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(TaskPhase::parse("planning"), None);
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(TransitionType::StartTask.required_source(), Some(TaskPhase::Idle));
        assert_eq!(TransitionType::StartTask.destination(), TaskPhase::Coding);
        assert_eq!(
            TransitionType::EnterReview.required_source(),
            Some(TaskPhase::Coding)
        );
        assert_eq!(TransitionType::EnterReview.destination(), TaskPhase::Review);
        assert_eq!(TransitionType::Complete.required_source(), None);
        assert_eq!(TransitionType::Fail.destination(), TaskPhase::Idle);
    }

    #[test]
    fn test_transition_serialization() {
        let json = serde_json::to_string(&TransitionType::EnterReview).unwrap();
        assert_eq!(json, "\"enter_review\"");
        assert_eq!(TransitionType::parse("fail"), Some(TransitionType::Fail));
    }
}
