/// Projects, identifiers and project members
///
/// # Endpoints
///
/// - `GET|POST /v1/workspaces/:slug/projects`
/// - `GET|PATCH|DELETE /v1/workspaces/:slug/projects/:project_id`
/// - `GET /v1/workspaces/:slug/project-identifiers?name=WEB`
/// - `GET|POST /v1/workspaces/:slug/projects/:project_id/members`
/// - `PATCH|DELETE /v1/workspaces/:slug/projects/:project_id/members/:member_id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::{auth::CurrentUser, permission::ResolvedScope},
    routes::validated,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use plane_shared::models::{
    project::{CreateProject, Project, ProjectIdentifier, ProjectMember, UpdateProject},
    role::ProjectRole,
    workspace::WorkspaceMember,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub identifier: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,

    pub identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifierResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddProjectMemberRequest {
    pub member_id: Uuid,

    #[serde(default = "default_project_role")]
    pub role: ProjectRole,
}

fn default_project_role() -> ProjectRole {
    ProjectRole::Member
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectMemberRequest {
    pub role: ProjectRole,
}

pub async fn list_projects(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = Project::list(&state.db, scope.workspace_id()?).await?;
    Ok(Json(projects))
}

/// Creates a project; the creator becomes its Admin
///
/// ```text
/// POST /v1/workspaces/acme/projects
/// { "name": "Web", "identifier": "web" }
/// ```
///
/// # Errors
///
/// - `400`: "Project Identifier is required"
/// - `409`: "Project Identifier is taken" or "Project name is already taken"
pub async fn create_project(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let req = validated(req)?;

    let project = Project::create(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        CreateProject {
            name: req.name,
            description: req.description,
            identifier: req.identifier,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Project>> {
    let project = Project::find(&state.db, scope.workspace_id()?, scope.project_id()?)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project does not exist".to_string()))?;

    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let req = validated(req)?;

    let project = Project::update(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        scope.project_id()?,
        UpdateProject {
            name: req.name,
            description: req.description,
            identifier: req.identifier,
        },
    )
    .await?;

    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
) -> ApiResult<StatusCode> {
    let project_id = scope.project_id()?;
    if !Project::delete(&state.db, scope.workspace_id()?, project_id).await? {
        return Err(ApiError::NotFound("Project does not exist".to_string()));
    }

    tracing::info!(project_id = %project_id, user_id = %current.id(), "Project deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Whether an identifier is already claimed in the workspace
pub async fn check_identifier(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Query(query): Query<IdentifierQuery>,
) -> ApiResult<Json<IdentifierResponse>> {
    if query.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }

    let exists = ProjectIdentifier::exists(&state.db, scope.workspace_id()?, &query.name).await?;
    Ok(Json(IdentifierResponse { exists }))
}

pub async fn list_members(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<ProjectMember>>> {
    let members = ProjectMember::list(&state.db, scope.project_id()?).await?;
    Ok(Json(members))
}

/// The requester's project role caps what they may grant
async fn requester_role(state: &AppState, project_id: Uuid, user_id: Uuid) -> ApiResult<ProjectRole> {
    ProjectMember::role_of(&state.db, project_id, user_id)
        .await?
        .ok_or(ApiError::Forbidden)
}

async fn load_member(state: &AppState, project_id: Uuid, id: Uuid) -> ApiResult<ProjectMember> {
    ProjectMember::find(&state.db, project_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project member does not exist".to_string()))
}

/// Adds a workspace member to the project
///
/// # Errors
///
/// - `400`: the user is not a member of the workspace
/// - `403`: the requested role is above the requester's own
/// - `409`: already a project member
pub async fn add_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<AddProjectMemberRequest>,
) -> ApiResult<(StatusCode, Json<ProjectMember>)> {
    let workspace_id = scope.workspace_id()?;
    let project_id = scope.project_id()?;

    if req.role > requester_role(&state, project_id, current.id()).await? {
        return Err(ApiError::Forbidden);
    }

    if WorkspaceMember::role_of(&state.db, workspace_id, req.member_id)
        .await?
        .is_none()
    {
        return Err(ApiError::BadRequest(
            "User is not a member of the workspace".to_string(),
        ));
    }

    let member = ProjectMember::add(
        &state.db,
        &current.ctx,
        workspace_id,
        project_id,
        req.member_id,
        req.role,
    )
    .await?;

    tracing::info!(
        project_id = %project_id,
        member_id = %req.member_id,
        role = req.role.rank(),
        "Project member added"
    );

    Ok((StatusCode::CREATED, Json(member)))
}

/// `403` when either the requested role or the member's current role is above the requester's
pub async fn update_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<UpdateProjectMemberRequest>,
) -> ApiResult<Json<ProjectMember>> {
    let project_id = scope.project_id()?;

    let target = load_member(&state, project_id, id).await?;
    let own = requester_role(&state, project_id, current.id()).await?;
    if req.role > own || target.role > own {
        return Err(ApiError::Forbidden);
    }

    let member = ProjectMember::update_role(&state.db, &current.ctx, project_id, id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project member does not exist".to_string()))?;

    Ok(Json(member))
}

/// Members can remove peers and lower roles, never someone above them
pub async fn remove_member(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let project_id = scope.project_id()?;

    let target = load_member(&state, project_id, id).await?;
    if target.role > requester_role(&state, project_id, current.id()).await? {
        return Err(ApiError::Forbidden);
    }

    if !ProjectMember::remove(&state.db, project_id, id).await? {
        return Err(ApiError::NotFound("Project member does not exist".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
