/// Project, project identifier and project membership models
///
/// A project belongs to exactly one workspace. Its short uppercase identifier
/// is claimed through a separate `project_identifiers` row whose
/// `UNIQUE (workspace_id, name)` constraint makes the claim exclusive: two
/// concurrent creates with the same identifier yield one success and one
/// [`ProjectError::IdentifierTaken`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY,
///     workspace_id UUID NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     identifier VARCHAR(12) NOT NULL,
///     ...
///     UNIQUE (workspace_id, name)
/// );
///
/// CREATE TABLE project_identifiers (
///     id UUID PRIMARY KEY,
///     workspace_id UUID NOT NULL,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     name VARCHAR(12) NOT NULL,
///     UNIQUE (workspace_id, name)
/// );
///
/// CREATE TABLE project_members (
///     id UUID PRIMARY KEY,
///     workspace_id UUID NOT NULL,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     member_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role SMALLINT NOT NULL DEFAULT 10,
///     UNIQUE (project_id, member_id)
/// );
/// ```

use crate::context::RequestContext;
use crate::models::{is_unique_violation, role::ProjectRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Longest identifier accepted
pub const MAX_IDENTIFIER_LEN: usize = 12;

/// Errors from project writes
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project Identifier is required")]
    IdentifierRequired,

    #[error("Project Identifier must be at most 12 characters")]
    IdentifierTooLong,

    /// Identifier collision while creating a project
    #[error("Project Identifier is taken")]
    IdentifierTaken,

    /// Identifier collision while renaming a project's identifier
    #[error("Project Identifier is already taken")]
    IdentifierAlreadyTaken,

    #[error("Project name is already taken")]
    NameTaken,

    #[error("Project does not exist")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Trims and uppercases an identifier, rejecting empty or oversized values
pub fn normalize_identifier(raw: &str) -> Result<String, ProjectError> {
    let identifier = raw.trim().to_uppercase();
    if identifier.is_empty() {
        return Err(ProjectError::IdentifierRequired);
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ProjectError::IdentifierTooLong);
    }
    Ok(identifier)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: String,

    /// Short uppercase code, unique within the workspace
    pub identifier: String,

    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub identifier: Option<String>,
}

fn map_project_write(err: sqlx::Error, identifier_conflict: ProjectError) -> ProjectError {
    if is_unique_violation(&err, "project_identifiers_workspace_name_key") {
        identifier_conflict
    } else if is_unique_violation(&err, "projects_workspace_name_key") {
        ProjectError::NameTaken
    } else {
        ProjectError::Database(err)
    }
}

impl Project {
    /// Creates a project, claims its identifier and makes the actor project Admin
    ///
    /// All three writes share one transaction, so a lost identifier race
    /// leaves no project row behind.
    pub async fn create(
        pool: &PgPool,
        ctx: &RequestContext,
        workspace_id: Uuid,
        data: CreateProject,
    ) -> Result<Self, ProjectError> {
        let identifier = normalize_identifier(&data.identifier)?;

        let mut tx = pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (workspace_id, name, description, identifier, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(data.name.trim())
        .bind(&data.description)
        .bind(&identifier)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_project_write(e, ProjectError::IdentifierTaken))?;

        ProjectIdentifier::claim(&mut *tx, workspace_id, project.id, &identifier)
            .await
            .map_err(|e| map_project_write(e, ProjectError::IdentifierTaken))?;

        ProjectMember::add(
            &mut *tx,
            ctx,
            workspace_id,
            project.id,
            ctx.actor_id,
            ProjectRole::Admin,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            project_id = %project.id,
            workspace_id = %workspace_id,
            identifier = %identifier,
            "Project created"
        );

        Ok(project)
    }

    /// Updates a project
    ///
    /// A changed identifier releases the old claim and takes the new one in
    /// the same transaction as the row update.
    pub async fn update(
        pool: &PgPool,
        ctx: &RequestContext,
        workspace_id: Uuid,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Self, ProjectError> {
        let identifier = data
            .identifier
            .as_deref()
            .map(normalize_identifier)
            .transpose()?;

        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE workspace_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ProjectError::NotFound)?;

        if let Some(identifier) = identifier.as_deref() {
            if identifier != current.identifier {
                sqlx::query("DELETE FROM project_identifiers WHERE project_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;

                ProjectIdentifier::claim(&mut *tx, workspace_id, id, identifier)
                    .await
                    .map_err(|e| map_project_write(e, ProjectError::IdentifierAlreadyTaken))?;
            }
        }

        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                identifier = COALESCE($5, identifier),
                updated_by = $6,
                updated_at = NOW()
            WHERE workspace_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(id)
        .bind(data.name.map(|n| n.trim().to_string()))
        .bind(data.description)
        .bind(identifier)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_project_write(e, ProjectError::IdentifierAlreadyTaken))?;

        tx.commit().await?;

        Ok(project)
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// True when the project exists and belongs to the workspace
    pub async fn belongs_to(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE workspace_id = $1 AND id = $2)",
        )
        .bind(workspace_id)
        .bind(id)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE workspace_id = $1 ORDER BY created_at DESC",
        )
        .bind(workspace_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectIdentifier {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ProjectIdentifier {
    /// Inserts the claim row; the unique constraint decides races
    pub async fn claim(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        project_id: Uuid,
        name: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectIdentifier>(
            r#"
            INSERT INTO project_identifiers (workspace_id, project_id, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(name)
        .fetch_one(executor)
        .await
    }

    /// Whether an identifier is already claimed in the workspace
    pub async fn exists(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM project_identifiers WHERE workspace_id = $1 AND name = $2)",
        )
        .bind(workspace_id)
        .bind(name.trim().to_uppercase())
        .fetch_one(executor)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub member_id: Uuid,
    pub role: ProjectRole,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectMember {
    pub async fn add(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        member_id: Uuid,
        role: ProjectRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            INSERT INTO project_members (workspace_id, project_id, member_id, role, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(member_id)
        .bind(role)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    /// Adds the member unless a row already exists; existing roles are left alone
    pub async fn ensure(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        member_id: Uuid,
        role: ProjectRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO project_members (workspace_id, project_id, member_id, role, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (project_id, member_id) DO NOTHING
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(member_id)
        .bind(role)
        .bind(ctx.actor_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            "SELECT * FROM project_members WHERE project_id = $1 AND id = $2",
        )
        .bind(project_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn role_of(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        sqlx::query_scalar::<_, ProjectRole>(
            "SELECT role FROM project_members WHERE project_id = $1 AND member_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Whether the user belongs to at least one project in the workspace
    pub async fn in_any_project(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM project_members WHERE workspace_id = $1 AND member_id = $2)",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            "SELECT * FROM project_members WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    /// Project memberships a user holds inside one workspace
    pub async fn list_for_user(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            "SELECT * FROM project_members WHERE workspace_id = $1 AND member_id = $2 ORDER BY created_at",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn update_role(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        project_id: Uuid,
        id: Uuid,
        role: ProjectRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            UPDATE project_members
            SET role = $3, updated_by = $4, updated_at = NOW()
            WHERE project_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(id)
        .bind(role)
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn remove(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drops every project membership a user holds in a workspace
    pub async fn remove_user_from_workspace(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        member_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM project_members WHERE workspace_id = $1 AND member_id = $2",
        )
        .bind(workspace_id)
        .bind(member_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_trimmed_and_uppercased() {
        assert_eq!(normalize_identifier("  web ").unwrap(), "WEB");
        assert_eq!(normalize_identifier("Api2").unwrap(), "API2");
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(matches!(
            normalize_identifier("   "),
            Err(ProjectError::IdentifierRequired)
        ));
        assert_eq!(
            ProjectError::IdentifierRequired.to_string(),
            "Project Identifier is required"
        );
    }

    #[test]
    fn test_long_identifier_rejected() {
        assert!(matches!(
            normalize_identifier("ABCDEFGHIJKLM"),
            Err(ProjectError::IdentifierTooLong)
        ));
        assert!(normalize_identifier("ABCDEFGHIJKL").is_ok());
    }

    #[test]
    fn test_conflict_messages() {
        assert_eq!(ProjectError::IdentifierTaken.to_string(), "Project Identifier is taken");
        assert_eq!(
            ProjectError::IdentifierAlreadyTaken.to_string(),
            "Project Identifier is already taken"
        );
    }
}
