/// Workspace and workspace membership models
///
/// A workspace is the top of the resource hierarchy. It owns projects and
/// carries its own membership table whose [`WorkspaceRole`] rank is the only
/// thing that grants access at workspace scope.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE workspaces (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     slug VARCHAR(48) NOT NULL UNIQUE,
///     owner_id UUID NOT NULL REFERENCES users(id),
///     created_by UUID, updated_by UUID,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE workspace_members (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     workspace_id UUID NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
///     member_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role SMALLINT NOT NULL DEFAULT 10,
///     ...
///     UNIQUE (workspace_id, member_id)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use plane_shared::context::RequestContext;
/// use plane_shared::models::workspace::{CreateWorkspace, Workspace, WorkspaceMember};
/// use plane_shared::models::role::WorkspaceRole;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner: Uuid) -> Result<(), sqlx::Error> {
/// let ctx = RequestContext::new(owner);
/// let ws = Workspace::create(&pool, &ctx, CreateWorkspace {
///     name: "Acme".to_string(),
///     slug: "acme".to_string(),
/// }).await?;
///
/// let role = WorkspaceMember::role_of(&pool, ws.id, owner).await?;
/// assert_eq!(role, Some(WorkspaceRole::Owner));
/// # Ok(())
/// # }
/// ```

use crate::context::RequestContext;
use crate::models::role::WorkspaceRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,

    /// URL-safe unique handle used in every nested route
    pub slug: String,

    pub owner_id: Uuid,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Workspace row plus its member count, as returned by list endpoints
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub workspace: Workspace,

    pub total_members: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWorkspace {
    pub name: Option<String>,
}

/// Checks slug shape: 1-48 chars of lowercase ascii letters, digits, `-` or `_`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 48
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl Workspace {
    /// Creates a workspace and makes the actor its Owner
    ///
    /// Both rows are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a unique-violation error on `workspaces_slug_key` if the slug is taken.
    pub async fn create(
        pool: &PgPool,
        ctx: &RequestContext,
        data: CreateWorkspace,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let workspace = sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (name, slug, owner_id, created_by, updated_by)
            VALUES ($1, $2, $3, $3, $3)
            RETURNING *
            "#,
        )
        .bind(data.name.trim())
        .bind(data.slug.trim().to_lowercase())
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await?;

        WorkspaceMember::add(
            &mut *tx,
            ctx,
            workspace.id,
            ctx.actor_id,
            WorkspaceRole::Owner,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(workspace_id = %workspace.id, slug = %workspace.slug, "Workspace created");

        Ok(workspace)
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_slug(
        executor: impl PgExecutor<'_>,
        slug: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE slug = $1")
            .bind(slug)
            .fetch_optional(executor)
            .await
    }

    /// Lists the workspaces a user belongs to, with member counts
    pub async fn list_for_user(
        executor: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceSummary>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceSummary>(
            r#"
            SELECT w.*,
                   (SELECT COUNT(*) FROM workspace_members m WHERE m.workspace_id = w.id)
                       AS total_members
            FROM workspaces w
            WHERE EXISTS (
                SELECT 1 FROM workspace_members wm
                WHERE wm.workspace_id = w.id AND wm.member_id = $1
            )
            ORDER BY w.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn update(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        id: Uuid,
        data: UpdateWorkspace,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(
            r#"
            UPDATE workspaces
            SET name = COALESCE($2, name),
                updated_by = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name.map(|n| n.trim().to_string()))
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a workspace; everything beneath it cascades
    pub async fn delete(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceMember {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub member_id: Uuid,
    pub role: WorkspaceRole,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceMember {
    /// Adds a member
    ///
    /// # Errors
    ///
    /// Unique violation on `workspace_members_workspace_member_key` if the user
    /// is already a member.
    pub async fn add(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        member_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMember>(
            r#"
            INSERT INTO workspace_members (workspace_id, member_id, role, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(member_id)
        .bind(role)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    /// Current role of a user, or `None` when no membership row exists
    pub async fn role_of(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error> {
        sqlx::query_scalar::<_, WorkspaceRole>(
            "SELECT role FROM workspace_members WHERE workspace_id = $1 AND member_id = $2",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMember>(
            "SELECT * FROM workspace_members WHERE workspace_id = $1 AND id = $2",
        )
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMember>(
            "SELECT * FROM workspace_members WHERE workspace_id = $1 ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(executor)
        .await
    }

    pub async fn update_role(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        id: Uuid,
        role: WorkspaceRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMember>(
            r#"
            UPDATE workspace_members
            SET role = $3, updated_by = $4, updated_at = NOW()
            WHERE workspace_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(id)
        .bind(role)
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    /// Removes a membership row by its ID
    pub async fn remove(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workspace_members WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a user's membership regardless of row ID
    pub async fn remove_user(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        member_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM workspace_members WHERE workspace_id = $1 AND member_id = $2",
        )
        .bind(workspace_id)
        .bind(member_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("acme"));
        assert!(is_valid_slug("acme-corp_2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("acme corp"));
        assert!(!is_valid_slug(&"a".repeat(49)));
    }

    #[test]
    fn test_summary_serializes_flat() {
        let summary = WorkspaceSummary {
            workspace: Workspace {
                id: Uuid::new_v4(),
                name: "Acme".to_string(),
                slug: "acme".to_string(),
                owner_id: Uuid::new_v4(),
                created_by: None,
                updated_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            total_members: 3,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["slug"], "acme");
        assert_eq!(json["total_members"], 3);
    }
}
