/// Project labels
///
/// Label names are unique per project (`labels_project_name_key`), which lets
/// integrations get-or-create a well-known label without racing.

use crate::context::RequestContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLabel {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLabel {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl Label {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: CreateLabel,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"
            INSERT INTO labels (workspace_id, project_id, name, description, color, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.name.trim())
        .bind(data.description)
        .bind(data.color)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    /// Returns the label with this name in the project, creating it if absent
    ///
    /// Takes a connection because it issues two statements; callers normally
    /// pass a transaction.
    pub async fn get_or_create(
        conn: &mut sqlx::PgConnection,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: CreateLabel,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO labels (workspace_id, project_id, name, description, color, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (project_id, name) DO NOTHING
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.color)
        .bind(ctx.actor_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, Label>("SELECT * FROM labels WHERE project_id = $1 AND name = $2")
            .bind(project_id)
            .bind(&data.name)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>("SELECT * FROM labels WHERE project_id = $1 ORDER BY name")
            .bind(project_id)
            .fetch_all(executor)
            .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>("SELECT * FROM labels WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn update(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        project_id: Uuid,
        id: Uuid,
        data: UpdateLabel,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"
            UPDATE labels
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                color = COALESCE($5, color),
                updated_by = $6,
                updated_at = NOW()
            WHERE project_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(id)
        .bind(data.name.map(|n| n.trim().to_string()))
        .bind(data.description)
        .bind(data.color)
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM labels WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
