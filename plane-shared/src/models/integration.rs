/// Integration catalogue and per-workspace installations
///
/// `integrations` is a read-mostly catalogue seeded by migration. A
/// `workspace_integrations` row records one installation together with the
/// bot user and bot API token created for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Provider slug of the GitHub integration
pub const GITHUB_PROVIDER: &str = "github";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Integration {
    pub id: Uuid,
    pub title: String,
    pub provider: String,
    pub network: i32,
    pub description: serde_json::Value,
    pub author: String,
    pub webhook_url: String,
    pub redirect_url: String,
    pub metadata: serde_json::Value,
    pub verified: bool,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    pub fn is_github(&self) -> bool {
        self.provider == GITHUB_PROVIDER
    }

    pub async fn list(executor: impl PgExecutor<'_>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Integration>("SELECT * FROM integrations ORDER BY title")
            .fetch_all(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Integration>("SELECT * FROM integrations WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_provider(
        executor: impl PgExecutor<'_>,
        provider: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Integration>("SELECT * FROM integrations WHERE provider = $1")
            .bind(provider)
            .fetch_optional(executor)
            .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceIntegration {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub integration_id: Uuid,

    /// Bot user acting for the integration
    pub actor_id: Uuid,
    pub api_token_id: Uuid,

    pub metadata: serde_json::Value,
    pub config: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new installation row
#[derive(Debug, Clone)]
pub struct NewWorkspaceIntegration {
    pub workspace_id: Uuid,
    pub integration_id: Uuid,
    pub actor_id: Uuid,
    pub api_token_id: Uuid,
    pub metadata: serde_json::Value,
    pub config: serde_json::Value,
    pub created_by: Uuid,
}

impl WorkspaceIntegration {
    /// Installation id stored in `config`, if any
    pub fn installation_id(&self) -> Option<i64> {
        match self.config.get("installation_id")? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Inserts an installation row
    ///
    /// # Errors
    ///
    /// Unique violation on `workspace_integrations_workspace_integration_key`
    /// when the integration is already installed in the workspace.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        data: NewWorkspaceIntegration,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceIntegration>(
            r#"
            INSERT INTO workspace_integrations (workspace_id, integration_id, actor_id, api_token_id,
                                                metadata, config, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.workspace_id)
        .bind(data.integration_id)
        .bind(data.actor_id)
        .bind(data.api_token_id)
        .bind(data.metadata)
        .bind(data.config)
        .bind(data.created_by)
        .fetch_one(executor)
        .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceIntegration>(
            "SELECT * FROM workspace_integrations WHERE workspace_id = $1 AND id = $2",
        )
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Whether the workspace already has this integration installed
    pub async fn is_installed(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
        integration_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM workspace_integrations WHERE workspace_id = $1 AND integration_id = $2)",
        )
        .bind(workspace_id)
        .bind(integration_id)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceIntegration>(
            "SELECT * FROM workspace_integrations WHERE workspace_id = $1 ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(executor)
        .await
    }

    /// Deletes the row, cascading to repository, issue and comment syncs
    pub async fn delete(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workspace_integrations WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn installation(config: serde_json::Value) -> WorkspaceIntegration {
        WorkspaceIntegration {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            integration_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            api_token_id: Uuid::new_v4(),
            metadata: json!({}),
            config,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_installation_id() {
        assert_eq!(installation(json!({"installation_id": 42})).installation_id(), Some(42));
        assert_eq!(installation(json!({"installation_id": "42"})).installation_id(), Some(42));
        assert_eq!(installation(json!({})).installation_id(), None);
        assert_eq!(installation(json!({"installation_id": "x"})).installation_id(), None);
    }
}
