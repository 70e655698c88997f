/// Uploaded file metadata
///
/// The bytes live in [`crate::storage::AssetStorage`] under the `asset` key.
/// Workspace assets are keyed `{workspace_id}/{hex}-{filename}`, user assets
/// `user-{hex}-{filename}`.

use crate::context::RequestContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileAsset {
    pub id: Uuid,
    pub asset: String,
    pub attributes: serde_json::Value,
    pub size: i64,
    pub workspace_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Keeps the final path component and replaces anything outside a safe set
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Storage key for an asset uploaded into a workspace
pub fn workspace_asset_key(workspace_id: Uuid, filename: &str) -> String {
    format!(
        "{}/{}-{}",
        workspace_id,
        Uuid::new_v4().simple(),
        sanitize_filename(filename)
    )
}

/// Storage key for an asset owned by a user
pub fn user_asset_key(filename: &str) -> String {
    format!("user-{}-{}", Uuid::new_v4().simple(), sanitize_filename(filename))
}

impl FileAsset {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        workspace_id: Option<Uuid>,
        asset: &str,
        attributes: serde_json::Value,
        size: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, FileAsset>(
            r#"
            INSERT INTO file_assets (asset, attributes, size, workspace_id, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(asset)
        .bind(attributes)
        .bind(size)
        .bind(workspace_id)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_key(
        executor: impl PgExecutor<'_>,
        asset: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileAsset>("SELECT * FROM file_assets WHERE asset = $1")
            .bind(asset)
            .fetch_optional(executor)
            .await
    }

    pub async fn delete(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_assets WHERE id = $1")
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
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("logo.png"), "logo.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\my file.txt"), "my_file.txt");
        assert_eq!(sanitize_filename(".."), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn test_workspace_asset_key() {
        let ws = Uuid::new_v4();
        let key = workspace_asset_key(ws, "logo.png");
        let (prefix, rest) = key.split_once('/').unwrap();
        assert_eq!(prefix, ws.to_string());
        assert_eq!(rest.len(), 32 + 1 + "logo.png".len());
        assert!(rest.ends_with("-logo.png"));
    }

    #[test]
    fn test_user_asset_key() {
        let key = user_asset_key("avatar.jpg");
        assert!(key.starts_with("user-"));
        assert!(key.ends_with("-avatar.jpg"));
        assert!(!key.contains('/'));
    }
}
