use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

/// Result of one test-runner invocation for a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestOutcome {
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TestOutcome {
    pub fn passed() -> Self {
        Self::with_status(TestStatus::Passed)
    }

    pub fn failed(raw_output: impl Into<String>) -> Self {
        Self {
            raw_output: Some(raw_output.into()),
            ..Self::with_status(TestStatus::Failed)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_status(TestStatus::Error)
        }
    }

    fn with_status(status: TestStatus) -> Self {
        Self {
            status,
            results: None,
            raw_output: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Rejected,
    NoResult,
    Error,
}

/// Result of one reviewer-agent invocation for a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub exit_code: i32,
}

impl ReviewOutcome {
    pub fn new(status: ReviewStatus, exit_code: i32) -> Self {
        Self {
            status,
            result: None,
            exit_code,
        }
    }

    pub fn approved() -> Self {
        Self::new(ReviewStatus::Approved, 0)
    }

    pub fn rejected() -> Self {
        Self::new(ReviewStatus::Rejected, 0)
    }
}

/// Single decision derived from a joined test + review pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Tests passed and the reviewer approved.
    Accept,
    /// The work ran but needs another attempt.
    Rework,
    /// One of the two sides could not produce a usable result.
    Error,
}

impl Verdict {
    pub fn from_outcomes(test: &TestOutcome, review: &ReviewOutcome) -> Self {
        if test.status == TestStatus::Error || review.status == ReviewStatus::Error {
            return Self::Error;
        }

        match (test.status, review.status) {
            (TestStatus::Passed, ReviewStatus::Approved) => Self::Accept,
            _ => Self::Rework,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Rework => "rework",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_accept() {
        assert_eq!(
            Verdict::from_outcomes(&TestOutcome::passed(), &ReviewOutcome::approved()),
            Verdict::Accept
        );
    }

    #[test]
    fn test_verdict_rework() {
        assert_eq!(
            Verdict::from_outcomes(&TestOutcome::failed("1 failed"), &ReviewOutcome::approved()),
            Verdict::Rework
        );
        assert_eq!(
            Verdict::from_outcomes(&TestOutcome::passed(), &ReviewOutcome::rejected()),
            Verdict::Rework
        );
        assert_eq!(
            Verdict::from_outcomes(
                &TestOutcome::passed(),
                &ReviewOutcome::new(ReviewStatus::NoResult, 0)
            ),
            Verdict::Rework
        );
    }

    #[test]
    fn test_verdict_error_wins() {
        assert_eq!(
            Verdict::from_outcomes(&TestOutcome::error("runner crashed"), &ReviewOutcome::approved()),
            Verdict::Error
        );
        assert_eq!(
            Verdict::from_outcomes(
                &TestOutcome::failed("x"),
                &ReviewOutcome::new(ReviewStatus::Error, 1)
            ),
            Verdict::Error
        );
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let json = serde_json::to_value(TestOutcome::passed()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "passed" }));

        let review = ReviewOutcome::new(ReviewStatus::NoResult, 2);
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["status"], "no_result");
        assert_eq!(json["exit_code"], 2);
    }
}
