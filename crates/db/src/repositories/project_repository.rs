use crate::error::DbError;
use crate::models::ProjectRow;
use sqlx::SqlitePool;
use swarmyard_core::{GitWorkingMode, Project};

const PROJECT_COLUMNS: &str = "id, name, repo_path, git_working_mode, archived, created_at";

/// Registered projects and their per-project settings.
#[derive(Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, project: &Project) -> Result<Project, DbError> {
        let row = ProjectRow::from(project);

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, repo_path, git_working_mode, archived, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.repo_path)
        .bind(&row.git_working_mode)
        .bind(row.archived)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(project.clone())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Project>, DbError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE id = ?",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_by_repo_path(&self, repo_path: &str) -> Result<Option<Project>, DbError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE repo_path = ?",
            PROJECT_COLUMNS
        ))
        .bind(repo_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    /// Projects that are not archived, oldest first.
    pub async fn find_active(&self) -> Result<Vec<Project>, DbError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE archived = 0 ORDER BY created_at ASC, id ASC",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn find_all(&self) -> Result<Vec<Project>, DbError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects ORDER BY created_at ASC, id ASC",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE projects SET archived = ? WHERE id = ?")
            .bind(archived)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn set_working_mode(&self, id: &str, mode: GitWorkingMode) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE projects SET git_working_mode = ? WHERE id = ?")
            .bind(mode.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn working_mode(&self, id: &str) -> Result<GitWorkingMode, DbError> {
        let mode: Option<(String,)> =
            sqlx::query_as("SELECT git_working_mode FROM projects WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match mode {
            Some((mode,)) => Ok(GitWorkingMode::parse(&mode).unwrap_or_default()),
            None => Err(DbError::ProjectNotFound(id.to_string())),
        }
    }
}
