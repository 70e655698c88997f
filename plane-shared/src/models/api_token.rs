/// API token model and database operations
///
/// API tokens authenticate humans and bots without a JWT. A token may be bound
/// to one workspace; such a token is refused everywhere else.
///
/// # Security
///
/// - Only the SHA-256 hash is stored
/// - The plaintext is returned once, from [`ApiToken::create`]
///
/// # Schema
///
/// ```sql
/// CREATE TABLE api_tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     workspace_id UUID REFERENCES workspaces(id) ON DELETE CASCADE,
///     label VARCHAR(255) NOT NULL,
///     user_type SMALLINT NOT NULL DEFAULT 0,   -- 0 human, 1 bot
///     token_prefix VARCHAR(16) NOT NULL,
///     token_hash CHAR(64) NOT NULL UNIQUE,
///     last_used_at TIMESTAMPTZ,
///     created_by UUID,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use plane_shared::models::api_token::{ApiToken, CreateApiToken, TokenUserType};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let (token, plaintext) = ApiToken::create(&pool, CreateApiToken {
///     user_id,
///     workspace_id: None,
///     label: None,
///     user_type: TokenUserType::Human,
///     created_by: Some(user_id),
/// }).await?;
///
/// // Save plaintext now, it is never shown again
/// let found = ApiToken::authenticate(&pool, &plaintext).await?;
/// assert_eq!(found.map(|t| t.id), Some(token.id));
/// # Ok(())
/// # }
/// ```

use crate::auth::api_token::{display_prefix, generate_api_token, hash_api_token};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Kind of user a token acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum TokenUserType {
    Human = 0,
    Bot = 1,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiToken {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Workspace the token is restricted to, if any
    pub workspace_id: Option<Uuid>,

    pub label: String,
    pub user_type: TokenUserType,

    /// First characters of the token, for display
    pub token_prefix: String,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiToken {
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,

    /// Defaults to a random hex label
    pub label: Option<String>,

    pub user_type: TokenUserType,
    pub created_by: Option<Uuid>,
}

impl ApiToken {
    /// Creates a token, returning the row and the plaintext value
    pub async fn create(
        executor: impl PgExecutor<'_>,
        data: CreateApiToken,
    ) -> Result<(Self, String), sqlx::Error> {
        let (plaintext, hash) = generate_api_token();
        let label = data
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let token = sqlx::query_as::<_, ApiToken>(
            r#"
            INSERT INTO api_tokens (user_id, workspace_id, label, user_type, token_prefix,
                                    token_hash, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.workspace_id)
        .bind(label)
        .bind(data.user_type)
        .bind(display_prefix(&plaintext))
        .bind(hash)
        .bind(data.created_by)
        .fetch_one(executor)
        .await?;

        Ok((token, plaintext))
    }

    /// Resolves a plaintext token and stamps `last_used_at`
    pub async fn authenticate(
        executor: impl PgExecutor<'_>,
        plaintext: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            r#"
            UPDATE api_tokens
            SET last_used_at = NOW()
            WHERE token_hash = $1
            RETURNING *
            "#,
        )
        .bind(hash_api_token(plaintext))
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_user(
        executor: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            "SELECT * FROM api_tokens WHERE user_id = $1 AND user_type = 0 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Deletes a token owned by the user
    pub async fn delete_for_user(
        executor: impl PgExecutor<'_>,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = $1")
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
    fn test_user_type_serde() {
        assert_eq!(serde_json::to_string(&TokenUserType::Bot).unwrap(), "\"bot\"");
        let t: TokenUserType = serde_json::from_str("\"human\"").unwrap();
        assert_eq!(t, TokenUserType::Human);
    }

    #[test]
    fn test_hash_not_serialized() {
        let token = ApiToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            workspace_id: None,
            label: "ci".to_string(),
            user_type: TokenUserType::Human,
            token_prefix: "plane_api_abcd".to_string(),
            token_hash: "0".repeat(64),
            last_used_at: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["label"], "ci");
    }
}
