/// Workspaces and workspace members
///
/// # Endpoints
///
/// - `GET|POST /v1/workspaces`
/// - `GET|PATCH|DELETE /v1/workspaces/:slug`
/// - `GET|POST /v1/workspaces/:slug/members`
/// - `PATCH|DELETE /v1/workspaces/:slug/members/:member_id`
/// - `GET /v1/workspaces/:slug/project-memberships`: the caller's project roles
///
/// Member management is Admin+. A requester never grants a role above their
/// own, and the workspace owner can be neither demoted nor removed.

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
use plane_shared::models::{
    project::ProjectMember,
    role::WorkspaceRole,
    user::User,
    workspace::{is_valid_slug, CreateWorkspace, UpdateWorkspace, Workspace, WorkspaceMember, WorkspaceSummary},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 80, message = "Name must be between 1 and 80 characters"))]
    pub name: String,

    pub slug: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkspaceRequest {
    #[validate(length(min = 1, max = 80, message = "Name must be between 1 and 80 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Please provide a valid email address."))]
    pub email: String,

    #[serde(default = "default_member_role")]
    pub role: WorkspaceRole,
}

fn default_member_role() -> WorkspaceRole {
    WorkspaceRole::Member
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: WorkspaceRole,
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<Vec<WorkspaceSummary>>> {
    let workspaces = Workspace::list_for_user(&state.db, current.id()).await?;
    Ok(Json(workspaces))
}

/// Creates a workspace owned by the caller
///
/// ```text
/// POST /v1/workspaces
/// { "name": "Acme", "slug": "acme" }
/// ```
///
/// # Errors
///
/// - `400`: malformed slug
/// - `409`: "Slug is already taken"
pub async fn create_workspace(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<Workspace>)> {
    let req = validated(req)?;

    let slug = req.slug.trim().to_lowercase();
    if !is_valid_slug(&slug) {
        return Err(ApiError::field(
            "slug",
            "Slug may only contain lowercase letters, digits, - and _",
        ));
    }

    let workspace = Workspace::create(
        &state.db,
        &current.ctx,
        CreateWorkspace {
            name: req.name,
            slug,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(workspace)))
}

pub async fn get_workspace(scope: ResolvedScope) -> ApiResult<Json<Workspace>> {
    Ok(Json(scope.workspace()?.clone()))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<UpdateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    let req = validated(req)?;

    let workspace = Workspace::update(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        UpdateWorkspace { name: req.name },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Workspace does not exist".to_string()))?;

    Ok(Json(workspace))
}

pub async fn delete_workspace(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
) -> ApiResult<StatusCode> {
    let workspace_id = scope.workspace_id()?;
    Workspace::delete(&state.db, workspace_id).await?;

    tracing::info!(workspace_id = %workspace_id, user_id = %current.id(), "Workspace deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<WorkspaceMember>>> {
    let members = WorkspaceMember::list(&state.db, scope.workspace_id()?).await?;
    Ok(Json(members))
}

/// Role of the requester, which caps what they may hand out
async fn requester_role(state: &AppState, workspace_id: Uuid, user_id: Uuid) -> ApiResult<WorkspaceRole> {
    WorkspaceMember::role_of(&state.db, workspace_id, user_id)
        .await?
        .ok_or(ApiError::Forbidden)
}

/// Adds an existing user by email
///
/// ```text
/// POST /v1/workspaces/acme/members
/// { "email": "sam@example.com", "role": 10 }
/// ```
pub async fn add_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<WorkspaceMember>)> {
    let req = validated(req)?;
    let workspace_id = scope.workspace_id()?;

    if req.role > requester_role(&state, workspace_id, current.id()).await? {
        return Err(ApiError::Forbidden);
    }

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    let member = WorkspaceMember::add(&state.db, &current.ctx, workspace_id, user.id, req.role).await?;

    tracing::info!(
        workspace_id = %workspace_id,
        member_id = %user.id,
        role = %req.role,
        "Workspace member added"
    );

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn update_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<WorkspaceMember>> {
    let workspace = scope.workspace()?;

    let target = WorkspaceMember::find(&state.db, workspace.id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace member does not exist".to_string()))?;

    if target.member_id == workspace.owner_id {
        return Err(ApiError::BadRequest(
            "The workspace owner's role cannot be changed".to_string(),
        ));
    }

    let own = requester_role(&state, workspace.id, current.id()).await?;
    if req.role > own || target.role > own {
        return Err(ApiError::Forbidden);
    }

    let member = WorkspaceMember::update_role(&state.db, &current.ctx, workspace.id, id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace member does not exist".to_string()))?;

    Ok(Json(member))
}

/// Removes a member together with all their project memberships
pub async fn remove_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let workspace = scope.workspace()?;

    let target = WorkspaceMember::find(&state.db, workspace.id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace member does not exist".to_string()))?;

    if target.member_id == workspace.owner_id {
        return Err(ApiError::BadRequest("The workspace owner cannot be removed".to_string()));
    }
    if target.role > requester_role(&state, workspace.id, current.id()).await? {
        return Err(ApiError::Forbidden);
    }

    let mut tx = state.db.begin().await?;
    let projects = ProjectMember::remove_user_from_workspace(&mut *tx, workspace.id, target.member_id).await?;
    WorkspaceMember::remove(&mut *tx, workspace.id, id).await?;
    tx.commit().await?;

    tracing::info!(
        workspace_id = %workspace.id,
        member_id = %target.member_id,
        project_memberships = projects,
        "Workspace member removed"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// The caller's project memberships inside the workspace
pub async fn my_project_memberships(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<ProjectMember>>> {
    let memberships = ProjectMember::list_for_user(&state.db, scope.workspace_id()?, current.id()).await?;
    Ok(Json(memberships))
}
