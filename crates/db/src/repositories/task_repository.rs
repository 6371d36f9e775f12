use crate::error::DbError;
use crate::models::TaskRow;
use chrono::Utc;
use sqlx::SqlitePool;
use swarmyard_core::{Task, TaskStatus, UpdateTaskRequest};

const TASK_COLUMNS: &str =
    "project_id, id, title, description, status, assignee, created_at, updated_at";

/// SQLite-backed issue store: tasks plus their labels and dependency edges.
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &Task) -> Result<Task, DbError> {
        let row = TaskRow::from(task);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (project_id, id, title, description, status, assignee, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.project_id)
        .bind(&row.id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.status)
        .bind(&row.assignee)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, label) in task.labels.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO task_labels (project_id, task_id, label, position) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.project_id)
            .bind(&row.id)
            .bind(label)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        for dependency in &task.depends_on {
            sqlx::query(
                "INSERT OR IGNORE INTO task_dependencies (project_id, task_id, depends_on_id) VALUES (?, ?, ?)",
            )
            .bind(&row.project_id)
            .bind(&row.id)
            .bind(dependency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(task.clone())
    }

    pub async fn find_by_id(&self, project_id: &str, id: &str) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE project_id = ? AND id = ?",
            TASK_COLUMNS
        ))
        .bind(project_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_all(&self, project_id: &str) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(rows).await
    }

    /// In-progress tasks whose assignee starts with `assignee_prefix`.
    pub async fn find_in_progress_by_assignee_prefix(
        &self,
        project_id: &str,
        assignee_prefix: &str,
    ) -> Result<Vec<Task>, DbError> {
        // substr() keeps the match case-sensitive, unlike LIKE.
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tasks
            WHERE project_id = ? AND status = ? AND assignee IS NOT NULL
              AND substr(assignee, 1, ?) = ?
            ORDER BY updated_at ASC, id ASC
            "#,
            TASK_COLUMNS
        ))
        .bind(project_id)
        .bind(TaskStatus::InProgress.as_str())
        .bind(assignee_prefix.chars().count() as i64)
        .bind(assignee_prefix)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(rows).await
    }

    pub async fn update(
        &self,
        project_id: &str,
        id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<Option<Task>, DbError> {
        let existing = self.find_by_id(project_id, id).await?;
        let Some(mut task) = existing else {
            return Ok(None);
        };

        if let Some(title) = &update.title {
            task.title = title.clone();
        }
        if let Some(description) = &update.description {
            task.description = description.clone();
        }
        if let Some(status) = &update.status {
            task.status = *status;
        }
        if let Some(assignee) = &update.assignee {
            task.assignee = assignee.clone();
        }

        task.updated_at = Utc::now();
        let row = TaskRow::from(&task);

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, status = ?, assignee = ?, updated_at = ?
            WHERE project_id = ? AND id = ?
            "#,
        )
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.status)
        .bind(&row.assignee)
        .bind(row.updated_at)
        .bind(&row.project_id)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        Ok(Some(task))
    }

    pub async fn add_label(&self, project_id: &str, id: &str, label: &str) -> Result<(), DbError> {
        self.ensure_exists(project_id, id).await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO task_labels (project_id, task_id, label, position)
            VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM task_labels WHERE project_id = ? AND task_id = ?))
            "#,
        )
        .bind(project_id)
        .bind(id)
        .bind(label)
        .bind(project_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns whether the label was present.
    pub async fn remove_label(&self, project_id: &str, id: &str, label: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM task_labels WHERE project_id = ? AND task_id = ? AND label = ?")
                .bind(project_id)
                .bind(id)
                .bind(label)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn labels(&self, project_id: &str, id: &str) -> Result<Vec<String>, DbError> {
        let labels: Vec<(String,)> = sqlx::query_as(
            "SELECT label FROM task_labels WHERE project_id = ? AND task_id = ? ORDER BY position ASC",
        )
        .bind(project_id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(labels.into_iter().map(|(l,)| l).collect())
    }

    pub async fn add_dependency(
        &self,
        project_id: &str,
        id: &str,
        depends_on_id: &str,
    ) -> Result<(), DbError> {
        self.ensure_exists(project_id, id).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (project_id, task_id, depends_on_id) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(id)
        .bind(depends_on_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ids of the tasks `id` directly depends on.
    pub async fn blockers(&self, project_id: &str, id: &str) -> Result<Vec<String>, DbError> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT depends_on_id FROM task_dependencies
            WHERE project_id = ? AND task_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(project_id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(d,)| d).collect())
    }

    pub async fn delete(&self, project_id: &str, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM tasks WHERE project_id = ? AND id = ?")
            .bind(project_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ensure_exists(&self, project_id: &str, id: &str) -> Result<(), DbError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM tasks WHERE project_id = ? AND id = ?")
                .bind(project_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match found {
            Some(_) => Ok(()),
            None => Err(DbError::TaskNotFound {
                project_id: project_id.to_string(),
                task_id: id.to_string(),
            }),
        }
    }

    async fn hydrate(&self, row: TaskRow) -> Result<Task, DbError> {
        let labels = self.labels(&row.project_id, &row.id).await?;
        let depends_on = self.blockers(&row.project_id, &row.id).await?;
        Ok(row.into_domain(labels, depends_on))
    }

    async fn hydrate_all(&self, rows: Vec<TaskRow>) -> Result<Vec<Task>, DbError> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate(row).await?);
        }
        Ok(tasks)
    }
}
