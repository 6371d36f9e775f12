use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// One orchestrator decision as recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorEvent {
    /// Insertion sequence; orders events within a project.
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub task_id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Event as handed to the audit log, before it is assigned a project and sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrchestratorEvent {
    pub task_id: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NewOrchestratorEvent {
    pub fn new(task_id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            event: event.into(),
            timestamp: truncate_to_millis(Utc::now()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Timestamps are kept at the millisecond precision the audit log stores.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = truncate_to_millis(timestamp);
        self
    }
}

/// Fixed-width RFC 3339 rendering (UTC, milliseconds) so that lexical order
/// of stored timestamps matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Smallest millisecond-precision instant not earlier than `ts`.
pub fn ceil_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = truncate_to_millis(ts);
    if truncated < ts {
        truncated + Duration::milliseconds(1)
    } else {
        truncated
    }
}
