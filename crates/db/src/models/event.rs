use chrono::{DateTime, Utc};
use swarmyard_core::OrchestratorEvent;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub seq: i64,
    pub project_id: String,
    pub task_id: String,
    pub timestamp: String,
    pub event: String,
    pub data: Option<String>,
}

impl EventRow {
    pub fn into_domain(self) -> Result<OrchestratorEvent, DbError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| DbError::CorruptRow {
                table: "orchestrator_events",
                reason: format!("seq {}: bad timestamp {:?}: {}", self.seq, self.timestamp, e),
            })?
            .with_timezone(&Utc);

        // Payloads are written by us as JSON; anything else is kept as a raw string.
        let data = self.data.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Ok(OrchestratorEvent {
            seq: self.seq,
            timestamp,
            project_id: self.project_id,
            task_id: self.task_id,
            event: self.event,
            data,
        })
    }
}
