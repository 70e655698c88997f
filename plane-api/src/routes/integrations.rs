/// Integration catalogue, workspace installs and GitHub sync records
///
/// Workspace-level routes live under `/v1/workspaces/:slug/workspace-integrations`,
/// project sync routes under `/v1/workspaces/:slug/projects/:project_id`.
/// Remote calls and the multi-row writes are in [`plane_shared::sync::SyncBridge`].

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::{auth::CurrentUser, permission::ResolvedScope},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use plane_shared::models::github::{
    GithubCommentSync, GithubIssueSync, NewIssueSync, RepositorySyncDetail,
};
use plane_shared::models::integration::{Integration, WorkspaceIntegration};
use plane_shared::sync::RepositorySyncInput;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub installation_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct BulkIssueSyncRequest {
    #[serde(default)]
    pub github_issue_syncs: Vec<NewIssueSync>,
}

#[derive(Debug, Deserialize)]
pub struct CommentSyncRequest {
    pub comment_id: Uuid,
    pub repo_comment_id: i64,
}

pub async fn list_integrations(State(state): State<AppState>) -> ApiResult<Json<Vec<Integration>>> {
    Ok(Json(Integration::list(&state.db).await?))
}

pub async fn list_workspace_integrations(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<WorkspaceIntegration>>> {
    let installed = WorkspaceIntegration::list(&state.db, scope.workspace_id()?).await?;
    Ok(Json(installed))
}

/// Installs a provider into the workspace
///
/// ```text
/// POST /v1/workspaces/acme/workspace-integrations/github
/// { "installation_id": 123456 }
/// ```
///
/// # Errors
///
/// - `400`: "Installation ID is required"
/// - `404`: unknown provider
/// - `409`: the workspace already has this integration
/// - `502`: GitHub rejected the installation lookup
pub async fn install(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, provider)): Path<(String, String)>,
    Json(req): Json<InstallRequest>,
) -> ApiResult<(StatusCode, Json<WorkspaceIntegration>)> {
    let installed = state
        .sync
        .install(&current.ctx, scope.workspace_id()?, &provider, req.installation_id)
        .await?;

    Ok((StatusCode::CREATED, Json(installed)))
}

pub async fn uninstall(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    state.sync.uninstall(scope.workspace_id()?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Repositories visible to the installation, 100 per page
pub async fn github_repositories(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, id)): Path<(String, Uuid)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let page = query.page.max(1);
    let repositories = state
        .sync
        .repositories(scope.workspace_id()?, id, page)
        .await?;
    Ok(Json(repositories))
}

pub async fn list_repository_syncs(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<RepositorySyncDetail>>> {
    Ok(Json(state.sync.list_repository_syncs(scope.project_id()?).await?))
}

/// Links the project to a repository, replacing the previous link
///
/// ```text
/// POST .../projects/{project_id}/workspace-integrations/{id}/github-repository-sync
/// { "name": "web", "url": "https://github.com/acme/web", "repository_id": 42, "owner": "acme" }
/// ```
pub async fn create_repository_sync(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<RepositorySyncInput>,
) -> ApiResult<(StatusCode, Json<RepositorySyncDetail>)> {
    let detail = state
        .sync
        .create_repository_sync(
            &current.ctx,
            scope.workspace_id()?,
            scope.project_id()?,
            id,
            req,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn list_issue_syncs(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, repo_sync_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<GithubIssueSync>>> {
    let rows = state
        .sync
        .list_issue_syncs(scope.workspace_id()?, scope.project_id()?, repo_sync_id)
        .await?;
    Ok(Json(rows))
}

pub async fn create_issue_sync(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, repo_sync_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<NewIssueSync>,
) -> ApiResult<(StatusCode, Json<GithubIssueSync>)> {
    let row = state
        .sync
        .create_issue_sync(
            &current.ctx,
            scope.workspace_id()?,
            scope.project_id()?,
            repo_sync_id,
            req,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// Records many issue links; pairs already linked are skipped
///
/// ```text
/// POST .../github-repository-sync/{id}/bulk-create-github-issue-sync
/// { "github_issue_syncs": [{ "issue": "...", "repo_issue_id": 7, "github_issue_id": 99, "issue_url": "..." }] }
/// ```
pub async fn bulk_create_issue_syncs(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, repo_sync_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<BulkIssueSyncRequest>,
) -> ApiResult<(StatusCode, Json<Vec<GithubIssueSync>>)> {
    let created = state
        .sync
        .bulk_create_issue_syncs(
            &current.ctx,
            scope.workspace_id()?,
            scope.project_id()?,
            repo_sync_id,
            req.github_issue_syncs,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_comment_syncs(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, repo_sync_id, issue_sync_id)): Path<(String, Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<GithubCommentSync>>> {
    let rows = state
        .sync
        .list_comment_syncs(
            scope.workspace_id()?,
            scope.project_id()?,
            repo_sync_id,
            issue_sync_id,
        )
        .await?;
    Ok(Json(rows))
}

pub async fn create_comment_sync(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, repo_sync_id, issue_sync_id)): Path<(String, Uuid, Uuid, Uuid)>,
    Json(req): Json<CommentSyncRequest>,
) -> ApiResult<(StatusCode, Json<GithubCommentSync>)> {
    let row = state
        .sync
        .create_comment_sync(
            &current.ctx,
            scope.workspace_id()?,
            scope.project_id()?,
            repo_sync_id,
            issue_sync_id,
            req.comment_id,
            req.repo_comment_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_to_first() {
        let query: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
    }

    #[test]
    fn test_bulk_request_parses() {
        let issue = Uuid::new_v4();
        let body = serde_json::json!({
            "github_issue_syncs": [{
                "issue": issue,
                "repo_issue_id": 7,
                "github_issue_id": 99,
                "issue_url": "https://github.com/acme/web/issues/7"
            }]
        });
        let req: BulkIssueSyncRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.github_issue_syncs.len(), 1);
        assert_eq!(req.github_issue_syncs[0].issue, issue);

        let empty: BulkIssueSyncRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.github_issue_syncs.is_empty());
    }
}
