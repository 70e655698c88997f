/// Cycles, cycle issues and cycle favorites
///
/// An issue belongs to at most one cycle (`cycle_issues_issue_key`). Adding an
/// issue to a cycle moves it there from wherever it was.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE cycles (
///     id UUID PRIMARY KEY,
///     workspace_id UUID NOT NULL, project_id UUID NOT NULL,
///     name VARCHAR(255) NOT NULL, description TEXT NOT NULL DEFAULT '',
///     start_date DATE, end_date DATE,
///     owned_by UUID NOT NULL REFERENCES users(id),
///     ...
/// );
/// CREATE TABLE cycle_issues (cycle_id, issue_id UNIQUE, ...);
/// CREATE TABLE cycle_favorites (cycle_id, user_id, UNIQUE (cycle_id, user_id));
/// ```

use super::BULK_CHUNK_SIZE;
use crate::context::RequestContext;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cycle {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub owned_by: Uuid,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCycle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCycle {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Rejects a date range that ends before it starts
pub fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err("End date cannot be before start date".to_string())
        }
        _ => Ok(()),
    }
}

impl Cycle {
    /// Creates a cycle owned by the actor
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: CreateCycle,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Cycle>(
            r#"
            INSERT INTO cycles (workspace_id, project_id, name, description, start_date, end_date,
                                owned_by, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $7)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.name.trim())
        .bind(data.description)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Cycle>("SELECT * FROM cycles WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Cycle>(
            "SELECT * FROM cycles WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    pub async fn update(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        project_id: Uuid,
        id: Uuid,
        data: UpdateCycle,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Cycle>(
            r#"
            UPDATE cycles
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                start_date = COALESCE($5, start_date),
                end_date = COALESCE($6, end_date),
                updated_by = $7,
                updated_at = NOW()
            WHERE project_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(id)
        .bind(data.name.map(|n| n.trim().to_string()))
        .bind(data.description)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cycles WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CycleIssue {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub cycle_id: Uuid,
    pub issue_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CycleIssue {
    /// Moves the given issues into the cycle
    ///
    /// Issues already in another cycle are reassigned. Rows are written in
    /// chunks inside one transaction.
    pub async fn add_issues(
        pool: &PgPool,
        ctx: &RequestContext,
        cycle: &Cycle,
        issue_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut ids = issue_ids.to_vec();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO cycle_issues (workspace_id, project_id, cycle_id, issue_id, created_by) ",
            );
            builder.push_values(chunk, |mut row, issue_id| {
                row.push_bind(cycle.workspace_id)
                    .push_bind(cycle.project_id)
                    .push_bind(cycle.id)
                    .push_bind(*issue_id)
                    .push_bind(ctx.actor_id);
            });
            builder.push(
                " ON CONFLICT (issue_id) DO UPDATE SET cycle_id = EXCLUDED.cycle_id, updated_at = NOW() \
                 RETURNING *",
            );

            rows.extend(
                builder
                    .build_query_as::<CycleIssue>()
                    .fetch_all(&mut *tx)
                    .await?,
            );
        }

        tx.commit().await?;

        Ok(rows)
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        cycle_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CycleIssue>(
            "SELECT * FROM cycle_issues WHERE cycle_id = $1 ORDER BY created_at",
        )
        .bind(cycle_id)
        .fetch_all(executor)
        .await
    }

    pub async fn remove(
        executor: impl PgExecutor<'_>,
        cycle_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cycle_issues WHERE cycle_id = $1 AND id = $2")
            .bind(cycle_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CycleFavorite {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl CycleFavorite {
    /// Favorites a cycle for the actor
    ///
    /// # Errors
    ///
    /// Unique violation on `cycle_favorites_cycle_user_key` when already a favorite.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        cycle: &Cycle,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, CycleFavorite>(
            r#"
            INSERT INTO cycle_favorites (workspace_id, project_id, cycle_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(cycle.workspace_id)
        .bind(cycle.project_id)
        .bind(cycle.id)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_user(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CycleFavorite>(
            "SELECT * FROM cycle_favorites WHERE project_id = $1 AND user_id = $2 ORDER BY created_at",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        cycle_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM cycle_favorites WHERE cycle_id = $1 AND user_id = $2")
                .bind(cycle_id)
                .bind(user_id)
                .execute(executor)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
