/// Modules, module members and module issues
///
/// Module members and module issues follow the replace-on-update pattern: a
/// submitted list replaces the stored set inside one transaction.

use super::BULK_CHUNK_SIZE;
use crate::context::RequestContext;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleStatus {
    Backlog,
    Planned,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Backlog => "backlog",
            ModuleStatus::Planned => "planned",
            ModuleStatus::InProgress => "in-progress",
            ModuleStatus::Paused => "paused",
            ModuleStatus::Completed => "completed",
            ModuleStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Module {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: String,
    pub lead_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateModule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: Option<ModuleStatus>,
    pub lead_id: Option<Uuid>,
    pub members_list: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateModule {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: Option<ModuleStatus>,
    pub lead_id: Option<Uuid>,
    pub members_list: Option<Vec<Uuid>>,
}

/// Module row with its member set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: Module,
    pub members: Vec<Uuid>,
}

async fn replace_members(
    conn: &mut PgConnection,
    ctx: &RequestContext,
    module: &Module,
    members: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM module_members WHERE module_id = $1")
        .bind(module.id)
        .execute(&mut *conn)
        .await?;

    if members.is_empty() {
        return Ok(());
    }

    for chunk in members.chunks(BULK_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO module_members (workspace_id, project_id, module_id, member_id, created_by) ",
        );
        builder.push_values(chunk, |mut row, member_id| {
            row.push_bind(module.workspace_id)
                .push_bind(module.project_id)
                .push_bind(module.id)
                .push_bind(*member_id)
                .push_bind(ctx.actor_id);
        });
        builder.push(" ON CONFLICT (module_id, member_id) DO NOTHING");
        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

impl Module {
    pub async fn create(
        pool: &PgPool,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: CreateModule,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let module = sqlx::query_as::<_, Module>(
            r#"
            INSERT INTO modules (workspace_id, project_id, name, description, start_date,
                                 target_date, status, lead_id, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'planned'), $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.name.trim())
        .bind(&data.description)
        .bind(data.start_date)
        .bind(data.target_date)
        .bind(data.status.map(|s| s.as_str()))
        .bind(data.lead_id)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(members) = data.members_list.as_deref() {
            replace_members(&mut *tx, ctx, &module, members).await?;
        }

        tx.commit().await?;

        Ok(module)
    }

    pub async fn update(
        pool: &PgPool,
        ctx: &RequestContext,
        project_id: Uuid,
        id: Uuid,
        data: UpdateModule,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(module) = sqlx::query_as::<_, Module>(
            r#"
            UPDATE modules
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                start_date = COALESCE($5, start_date),
                target_date = COALESCE($6, target_date),
                status = COALESCE($7, status),
                lead_id = COALESCE($8, lead_id),
                updated_by = $9,
                updated_at = NOW()
            WHERE project_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(data.description.as_deref())
        .bind(data.start_date)
        .bind(data.target_date)
        .bind(data.status.map(|s| s.as_str()))
        .bind(data.lead_id)
        .bind(ctx.actor_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        if let Some(members) = data.members_list.as_deref() {
            replace_members(&mut *tx, ctx, &module, members).await?;
        }

        tx.commit().await?;

        Ok(Some(module))
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Module>("SELECT * FROM modules WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn detail(
        pool: &PgPool,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ModuleDetail>, sqlx::Error> {
        let Some(module) = Self::find(pool, project_id, id).await? else {
            return Ok(None);
        };

        let members = sqlx::query_scalar::<_, Uuid>(
            "SELECT member_id FROM module_members WHERE module_id = $1 ORDER BY created_at",
        )
        .bind(module.id)
        .fetch_all(pool)
        .await?;

        Ok(Some(ModuleDetail { module, members }))
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Module>(
            "SELECT * FROM modules WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM modules WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModuleIssue {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub module_id: Uuid,
    pub issue_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ModuleIssue {
    /// Replaces the module's issue set
    pub async fn replace(
        pool: &PgPool,
        ctx: &RequestContext,
        module: &Module,
        issue_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM module_issues WHERE module_id = $1")
            .bind(module.id)
            .execute(&mut *tx)
            .await?;

        let mut rows = Vec::with_capacity(issue_ids.len());
        for chunk in issue_ids.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO module_issues (workspace_id, project_id, module_id, issue_id, created_by) ",
            );
            builder.push_values(chunk, |mut row, issue_id| {
                row.push_bind(module.workspace_id)
                    .push_bind(module.project_id)
                    .push_bind(module.id)
                    .push_bind(*issue_id)
                    .push_bind(ctx.actor_id);
            });
            builder.push(" ON CONFLICT (module_id, issue_id) DO NOTHING RETURNING *");
            rows.extend(
                builder
                    .build_query_as::<ModuleIssue>()
                    .fetch_all(&mut *tx)
                    .await?,
            );
        }

        tx.commit().await?;

        Ok(rows)
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        module_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ModuleIssue>(
            "SELECT * FROM module_issues WHERE module_id = $1 ORDER BY created_at",
        )
        .bind(module_id)
        .fetch_all(executor)
        .await
    }

    pub async fn remove(
        executor: impl PgExecutor<'_>,
        module_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM module_issues WHERE module_id = $1 AND id = $2")
            .bind(module_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ModuleStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        let status: ModuleStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status.as_str(), "cancelled");
    }
}
