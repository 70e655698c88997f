/// GitHub repository linkage
///
/// A project is linked to at most one repository through a
/// [`GithubRepositorySync`]. Issues and comments mirrored to GitHub are tracked
/// by [`GithubIssueSync`] and [`GithubCommentSync`]. Deleting a repository sync
/// cascades to both.
///
/// # Schema
///
/// ```sql
/// github_repositories      (project_id, name, url, config, repository_id BIGINT, owner)
/// github_repository_syncs  (repository_id, workspace_integration_id, actor_id, credentials,
///                           label_id, UNIQUE (project_id))
/// github_issue_syncs       (repository_sync_id, issue_id, repo_issue_id, github_issue_id,
///                           issue_url, UNIQUE (issue_id, repository_sync_id))
/// github_comment_syncs     (issue_sync_id, comment_id, repo_comment_id,
///                           UNIQUE (comment_id, issue_sync_id))
/// ```

use crate::context::RequestContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use super::BULK_CHUNK_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GithubRepository {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub config: serde_json::Value,

    /// Repository id on GitHub
    pub repository_id: i64,
    pub owner: String,

    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGithubRepository {
    pub name: String,
    pub url: Option<String>,
    pub config: serde_json::Value,
    pub repository_id: i64,
    pub owner: String,
}

impl GithubRepository {
    pub async fn create(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: NewGithubRepository,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GithubRepository>(
            r#"
            INSERT INTO github_repositories (workspace_id, project_id, name, url, config,
                                             repository_id, owner, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.name)
        .bind(data.url)
        .bind(data.config)
        .bind(data.repository_id)
        .bind(data.owner)
        .bind(ctx.actor_id)
        .fetch_one(conn)
        .await
    }

    /// Removes every repository linked to the project
    ///
    /// Cascades through repository syncs to issue and comment syncs.
    pub async fn delete_for_project(
        conn: &mut PgConnection,
        project_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM github_repositories WHERE project_id = $1")
            .bind(project_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GithubRepositorySync {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub repository_id: Uuid,
    pub workspace_integration_id: Uuid,
    pub actor_id: Uuid,
    pub credentials: serde_json::Value,
    pub label_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository sync joined with its repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySyncDetail {
    #[serde(flatten)]
    pub sync: GithubRepositorySync,
    pub repository: GithubRepository,
}

#[derive(Debug, Clone)]
pub struct NewRepositorySync {
    pub repository_id: Uuid,
    pub workspace_integration_id: Uuid,
    pub actor_id: Uuid,
    pub credentials: serde_json::Value,
    pub label_id: Option<Uuid>,
}

impl GithubRepositorySync {
    pub async fn create(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: NewRepositorySync,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GithubRepositorySync>(
            r#"
            INSERT INTO github_repository_syncs (workspace_id, project_id, repository_id,
                                                 workspace_integration_id, actor_id, credentials,
                                                 label_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.repository_id)
        .bind(data.workspace_integration_id)
        .bind(data.actor_id)
        .bind(data.credentials)
        .bind(data.label_id)
        .bind(ctx.actor_id)
        .fetch_one(conn)
        .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GithubRepositorySync>(
            "SELECT * FROM github_repository_syncs WHERE project_id = $1 AND id = $2",
        )
        .bind(project_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_project(
        conn: &mut PgConnection,
        project_id: Uuid,
    ) -> Result<Vec<RepositorySyncDetail>, sqlx::Error> {
        let syncs = sqlx::query_as::<_, GithubRepositorySync>(
            "SELECT * FROM github_repository_syncs WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut details = Vec::with_capacity(syncs.len());
        for sync in syncs {
            let repository = sqlx::query_as::<_, GithubRepository>(
                "SELECT * FROM github_repositories WHERE id = $1",
            )
            .bind(sync.repository_id)
            .fetch_one(&mut *conn)
            .await?;
            details.push(RepositorySyncDetail { sync, repository });
        }

        Ok(details)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GithubIssueSync {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub repository_sync_id: Uuid,
    pub issue_id: Uuid,
    pub repo_issue_id: i64,
    pub github_issue_id: i64,
    pub issue_url: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One issue-to-GitHub link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssueSync {
    pub issue: Uuid,
    pub repo_issue_id: i64,
    pub github_issue_id: i64,
    pub issue_url: String,
}

impl GithubIssueSync {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        sync: &GithubRepositorySync,
        data: NewIssueSync,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GithubIssueSync>(
            r#"
            INSERT INTO github_issue_syncs (workspace_id, project_id, repository_sync_id, issue_id,
                                            repo_issue_id, github_issue_id, issue_url, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(sync.workspace_id)
        .bind(sync.project_id)
        .bind(sync.id)
        .bind(data.issue)
        .bind(data.repo_issue_id)
        .bind(data.github_issue_id)
        .bind(data.issue_url)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    /// Inserts links in chunks, skipping pairs that already exist
    ///
    /// Only the newly inserted rows are returned.
    pub async fn bulk_create(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        sync: &GithubRepositorySync,
        rows: &[NewIssueSync],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut created = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO github_issue_syncs (workspace_id, project_id, repository_sync_id, \
                 issue_id, repo_issue_id, github_issue_id, issue_url, created_by) ",
            );
            builder.push_values(chunk.iter(), |mut row, item| {
                row.push_bind(sync.workspace_id)
                    .push_bind(sync.project_id)
                    .push_bind(sync.id)
                    .push_bind(item.issue)
                    .push_bind(item.repo_issue_id)
                    .push_bind(item.github_issue_id)
                    .push_bind(item.issue_url.clone())
                    .push_bind(ctx.actor_id);
            });
            builder.push(" ON CONFLICT (issue_id, repository_sync_id) DO NOTHING RETURNING *");

            let inserted = builder
                .build_query_as::<GithubIssueSync>()
                .fetch_all(&mut *conn)
                .await?;
            created.extend(inserted);
        }

        Ok(created)
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        repository_sync_id: Uuid,
        issue_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GithubIssueSync>(
            "SELECT * FROM github_issue_syncs WHERE repository_sync_id = $1 AND issue_id = $2",
        )
        .bind(repository_sync_id)
        .bind(issue_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        repository_sync_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GithubIssueSync>(
            "SELECT * FROM github_issue_syncs WHERE repository_sync_id = $1 AND id = $2",
        )
        .bind(repository_sync_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        repository_sync_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GithubIssueSync>(
            "SELECT * FROM github_issue_syncs WHERE repository_sync_id = $1 ORDER BY created_at",
        )
        .bind(repository_sync_id)
        .fetch_all(executor)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GithubCommentSync {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub issue_sync_id: Uuid,
    pub comment_id: Uuid,
    pub repo_comment_id: i64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GithubCommentSync {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        issue_sync: &GithubIssueSync,
        comment_id: Uuid,
        repo_comment_id: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GithubCommentSync>(
            r#"
            INSERT INTO github_comment_syncs (workspace_id, project_id, issue_sync_id, comment_id,
                                              repo_comment_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(issue_sync.workspace_id)
        .bind(issue_sync.project_id)
        .bind(issue_sync.id)
        .bind(comment_id)
        .bind(repo_comment_id)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        issue_sync_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GithubCommentSync>(
            "SELECT * FROM github_comment_syncs WHERE issue_sync_id = $1 ORDER BY created_at",
        )
        .bind(issue_sync_id)
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_issue_sync_deserializes() {
        let issue = Uuid::new_v4();
        let body = serde_json::json!({
            "issue": issue,
            "repo_issue_id": 12,
            "github_issue_id": 998877,
            "issue_url": "https://github.com/acme/web/issues/12"
        });
        let parsed: NewIssueSync = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.issue, issue);
        assert_eq!(parsed.repo_issue_id, 12);
    }

    #[test]
    fn test_chunking_boundary() {
        let rows = 250;
        let chunks: Vec<usize> = (0..rows)
            .collect::<Vec<_>>()
            .chunks(BULK_CHUNK_SIZE)
            .map(|c| c.len())
            .collect();
        assert_eq!(chunks, vec![100, 100, 50]);
    }
}
