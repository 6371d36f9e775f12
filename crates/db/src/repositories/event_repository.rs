use crate::error::DbError;
use crate::models::EventRow;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use swarmyard_core::{
    ceil_to_millis, format_timestamp, truncate_to_millis, NewOrchestratorEvent, OrchestratorEvent,
};

const EVENT_COLUMNS: &str = "seq, project_id, task_id, timestamp, event, data";

/// Append-only storage for orchestrator events. Rows are never updated or deleted here.
#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        project_id: &str,
        event: &NewOrchestratorEvent,
    ) -> Result<OrchestratorEvent, DbError> {
        let data = event.data.as_ref().map(|d| d.to_string());
        let timestamp = truncate_to_millis(event.timestamp);

        let result = sqlx::query(
            r#"
            INSERT INTO orchestrator_events (project_id, task_id, timestamp, event, data)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(project_id)
        .bind(&event.task_id)
        .bind(format_timestamp(&timestamp))
        .bind(&event.event)
        .bind(&data)
        .execute(&self.pool)
        .await?;

        Ok(OrchestratorEvent {
            seq: result.last_insert_rowid(),
            timestamp,
            project_id: project_id.to_string(),
            task_id: event.task_id.clone(),
            event: event.event.clone(),
            data: event.data.clone(),
        })
    }

    /// Events at or after `since`, in insertion order.
    ///
    /// Stored timestamps have millisecond precision, so a finer bound is
    /// rounded up rather than down.
    pub async fn find_since(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrchestratorEvent>, DbError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM orchestrator_events
            WHERE project_id = ? AND timestamp >= ?
            ORDER BY seq ASC
            "#,
            EVENT_COLUMNS
        ))
        .bind(project_id)
        .bind(format_timestamp(&ceil_to_millis(since)))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_domain).collect()
    }

    pub async fn find_by_task(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Vec<OrchestratorEvent>, DbError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM orchestrator_events
            WHERE project_id = ? AND task_id = ?
            ORDER BY seq ASC
            "#,
            EVENT_COLUMNS
        ))
        .bind(project_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_domain).collect()
    }

    /// The `limit` most recent events, returned oldest first.
    pub async fn find_recent(
        &self,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<OrchestratorEvent>, DbError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {cols} FROM (
                SELECT {cols} FROM orchestrator_events
                WHERE project_id = ?
                ORDER BY seq DESC
                LIMIT ?
            )
            ORDER BY seq ASC
            "#,
            cols = EVENT_COLUMNS
        ))
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_domain).collect()
    }

    pub async fn count(&self, project_id: &str) -> Result<i64, DbError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM orchestrator_events WHERE project_id = ?")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }
}
