/// Issues and their satellites
///
/// # Endpoints
///
/// Under `/v1/workspaces/:slug/projects/:project_id`:
///
/// - `GET|POST /issues`
/// - `GET|PATCH|DELETE /issues/:issue_id`
/// - `GET /issues/:issue_id/activities`
/// - `GET|POST /issues/:issue_id/comments`, `PATCH|DELETE /issues/:issue_id/comments/:comment_id`
/// - `GET|POST /issues/:issue_id/links`, `DELETE /issues/:issue_id/links/:link_id`
///
/// `assignees_list`, `labels_list`, `blockers_list` and `blocks_list` each
/// replace the whole set when present.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::{auth::CurrentUser, permission::ResolvedScope},
    routes::validated,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use plane_shared::models::cycle::validate_dates;
use plane_shared::models::issue::{
    CreateIssue, Issue, IssueActivity, IssueComment, IssueDetail, IssueLink, IssuePriority,
    UpdateIssue,
};
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIssueRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub priority: Option<IssuePriority>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub sort_order: Option<f64>,
    pub assignees_list: Option<Vec<Uuid>>,
    pub labels_list: Option<Vec<Uuid>>,
    pub blockers_list: Option<Vec<Uuid>>,
    pub blocks_list: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIssueRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub sort_order: Option<f64>,
    pub assignees_list: Option<Vec<Uuid>>,
    pub labels_list: Option<Vec<Uuid>>,
    pub blockers_list: Option<Vec<Uuid>>,
    pub blocks_list: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, message = "Comment cannot be empty"))]
    pub comment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLinkRequest {
    #[serde(default)]
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: String,

    #[validate(url(message = "Please provide a valid URL"))]
    pub url: String,
}

fn issue_not_found() -> ApiError {
    ApiError::NotFound("Issue does not exist".to_string())
}

/// Every id in `ids` must be an issue of the project
pub(crate) async fn ensure_project_issues(
    state: &AppState,
    project_id: Uuid,
    field: &str,
    ids: &[Uuid],
) -> ApiResult<()> {
    let unique: Vec<Uuid> = ids.iter().copied().collect::<HashSet<_>>().into_iter().collect();
    if unique.is_empty() {
        return Ok(());
    }
    let found = Issue::count_in_project(&state.db, project_id, &unique).await?;
    if found != unique.len() as i64 {
        return Err(ApiError::field(field, "Issues must belong to the same project"));
    }
    Ok(())
}

async fn check_related_issues(
    state: &AppState,
    project_id: Uuid,
    blockers: Option<&Vec<Uuid>>,
    blocks: Option<&Vec<Uuid>>,
) -> ApiResult<()> {
    for (field, ids) in [("blockers_list", blockers), ("blocks_list", blocks)] {
        if let Some(ids) = ids {
            ensure_project_issues(state, project_id, field, ids).await?;
        }
    }
    Ok(())
}

async fn load_issue(state: &AppState, project_id: Uuid, issue_id: Uuid) -> ApiResult<Issue> {
    Issue::find(&state.db, project_id, issue_id)
        .await?
        .ok_or_else(issue_not_found)
}

pub async fn list_issues(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<Issue>>> {
    Ok(Json(Issue::list(&state.db, scope.project_id()?).await?))
}

/// Creates an issue
///
/// ```text
/// POST /v1/workspaces/acme/projects/{project_id}/issues
/// { "name": "Broken login", "priority": "high", "assignees_list": ["..."] }
/// ```
pub async fn create_issue(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<CreateIssueRequest>,
) -> ApiResult<(StatusCode, Json<IssueDetail>)> {
    let req = validated(req)?;
    let project_id = scope.project_id()?;

    validate_dates(req.start_date, req.target_date)
        .map_err(|msg| ApiError::field("target_date", msg))?;
    check_related_issues(&state, project_id, req.blockers_list.as_ref(), req.blocks_list.as_ref())
        .await?;

    let issue = Issue::create(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        project_id,
        CreateIssue {
            name: req.name,
            description: req.description,
            priority: req.priority,
            start_date: req.start_date,
            target_date: req.target_date,
            sort_order: req.sort_order,
            assignees_list: req.assignees_list,
            labels_list: req.labels_list,
            blockers_list: req.blockers_list,
            blocks_list: req.blocks_list,
        },
    )
    .await?;

    let detail = Issue::detail(&state.db, project_id, issue.id)
        .await?
        .ok_or_else(issue_not_found)?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_issue(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<IssueDetail>> {
    let detail = Issue::detail(&state.db, scope.project_id()?, issue_id)
        .await?
        .ok_or_else(issue_not_found)?;
    Ok(Json(detail))
}

pub async fn update_issue(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<UpdateIssueRequest>,
) -> ApiResult<Json<IssueDetail>> {
    let req = validated(req)?;
    let project_id = scope.project_id()?;

    let existing = load_issue(&state, project_id, issue_id).await?;
    validate_dates(
        req.start_date.or(existing.start_date),
        req.target_date.or(existing.target_date),
    )
    .map_err(|msg| ApiError::field("target_date", msg))?;
    check_related_issues(&state, project_id, req.blockers_list.as_ref(), req.blocks_list.as_ref())
        .await?;

    Issue::update(
        &state.db,
        &current.ctx,
        project_id,
        issue_id,
        UpdateIssue {
            name: req.name,
            description: req.description,
            priority: req.priority,
            start_date: req.start_date,
            target_date: req.target_date,
            sort_order: req.sort_order,
            assignees_list: req.assignees_list,
            labels_list: req.labels_list,
            blockers_list: req.blockers_list,
            blocks_list: req.blocks_list,
        },
    )
    .await?
    .ok_or_else(issue_not_found)?;

    let detail = Issue::detail(&state.db, project_id, issue_id)
        .await?
        .ok_or_else(issue_not_found)?;

    Ok(Json(detail))
}

pub async fn delete_issue(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if !Issue::delete(&state.db, scope.project_id()?, issue_id).await? {
        return Err(issue_not_found());
    }

    tracing::info!(issue_id = %issue_id, user_id = %current.id(), "Issue deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_activity(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<IssueActivity>>> {
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;
    Ok(Json(IssueActivity::list(&state.db, issue.id).await?))
}

pub async fn list_comments(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<IssueComment>>> {
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;
    Ok(Json(IssueComment::list(&state.db, issue.id).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<IssueComment>)> {
    let req = validated(req)?;
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;

    let comment = IssueComment::create(&state.db, &current.ctx, &issue, &req.comment).await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Comments can only be edited by their author
pub async fn update_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id, comment_id)): Path<(String, Uuid, Uuid, Uuid)>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<IssueComment>> {
    let req = validated(req)?;
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;

    let existing = IssueComment::find(&state.db, issue.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment does not exist".to_string()))?;
    if existing.actor_id != Some(current.id()) {
        return Err(ApiError::Forbidden);
    }

    let comment = IssueComment::update(&state.db, &current.ctx, issue.id, comment_id, &req.comment)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment does not exist".to_string()))?;

    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id, comment_id)): Path<(String, Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;

    let existing = IssueComment::find(&state.db, issue.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment does not exist".to_string()))?;
    if existing.actor_id != Some(current.id()) {
        return Err(ApiError::Forbidden);
    }

    IssueComment::delete(&state.db, issue.id, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_links(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<IssueLink>>> {
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;
    Ok(Json(IssueLink::list(&state.db, issue.id).await?))
}

pub async fn create_link(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<CreateLinkRequest>,
) -> ApiResult<(StatusCode, Json<IssueLink>)> {
    let req = validated(req)?;
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;

    let link = IssueLink::create(&state.db, &current.ctx, &issue, &req.title, &req.url).await?;

    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn delete_link(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, issue_id, link_id)): Path<(String, Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let issue = load_issue(&state, scope.project_id()?, issue_id).await?;

    if !IssueLink::delete(&state.db, issue.id, link_id).await? {
        return Err(ApiError::NotFound("Link does not exist".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_issue_request_requires_name() {
        let req: CreateIssueRequest = serde_json::from_value(serde_json::json!({
            "name": "",
            "priority": "high"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_link_request_requires_url() {
        let req = CreateLinkRequest {
            title: "Docs".to_string(),
            url: "not a url".to_string(),
        };
        assert!(req.validate().is_err());

        let req = CreateLinkRequest {
            title: "Docs".to_string(),
            url: "https://docs.plane.so".to_string(),
        };
        assert!(req.validate().is_ok());
    }
}
