/// Modules and module issues
///
/// Under `/v1/workspaces/:slug/projects/:project_id`:
///
/// - `GET|POST /modules`, `GET|PATCH|DELETE /modules/:module_id`
/// - `GET|POST /modules/:module_id/module-issues`, `DELETE /modules/:module_id/module-issues/:id`
///
/// `members_list` and a posted issue list replace the stored set.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::{auth::CurrentUser, permission::ResolvedScope},
    routes::{issues::ensure_project_issues, validated},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use plane_shared::models::cycle::validate_dates;
use plane_shared::models::module::{
    CreateModule, Module, ModuleDetail, ModuleIssue, ModuleStatus, UpdateModule,
};
use plane_shared::models::project::ProjectMember;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: Option<ModuleStatus>,
    pub lead_id: Option<Uuid>,
    pub members_list: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateModuleRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: Option<ModuleStatus>,
    pub lead_id: Option<Uuid>,
    pub members_list: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleIssuesRequest {
    #[serde(default)]
    pub issues: Vec<Uuid>,
}

fn module_not_found() -> ApiError {
    ApiError::NotFound("Module does not exist".to_string())
}

/// Lead and members must belong to the project
async fn ensure_project_members(
    state: &AppState,
    project_id: Uuid,
    lead: Option<Uuid>,
    members: Option<&Vec<Uuid>>,
) -> ApiResult<()> {
    let candidates = lead
        .map(|id| ("lead_id", id))
        .into_iter()
        .chain(members.into_iter().flatten().map(|id| ("members_list", *id)));

    for (field, user_id) in candidates {
        if ProjectMember::role_of(&state.db, project_id, user_id)
            .await?
            .is_none()
        {
            return Err(ApiError::field(field, "User is not a member of the project"));
        }
    }
    Ok(())
}

async fn load_module(state: &AppState, project_id: Uuid, module_id: Uuid) -> ApiResult<Module> {
    Module::find(&state.db, project_id, module_id)
        .await?
        .ok_or_else(module_not_found)
}

pub async fn list_modules(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<Module>>> {
    Ok(Json(Module::list(&state.db, scope.project_id()?).await?))
}

pub async fn create_module(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<CreateModuleRequest>,
) -> ApiResult<(StatusCode, Json<ModuleDetail>)> {
    let req = validated(req)?;
    let project_id = scope.project_id()?;

    validate_dates(req.start_date, req.target_date)
        .map_err(|msg| ApiError::field("target_date", msg))?;
    ensure_project_members(&state, project_id, req.lead_id, req.members_list.as_ref()).await?;

    let module = Module::create(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        project_id,
        CreateModule {
            name: req.name,
            description: req.description,
            start_date: req.start_date,
            target_date: req.target_date,
            status: req.status,
            lead_id: req.lead_id,
            members_list: req.members_list,
        },
    )
    .await?;

    let detail = Module::detail(&state.db, project_id, module.id)
        .await?
        .ok_or_else(module_not_found)?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_module(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<ModuleDetail>> {
    let detail = Module::detail(&state.db, scope.project_id()?, module_id)
        .await?
        .ok_or_else(module_not_found)?;
    Ok(Json(detail))
}

pub async fn update_module(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<UpdateModuleRequest>,
) -> ApiResult<Json<ModuleDetail>> {
    let req = validated(req)?;
    let project_id = scope.project_id()?;

    let existing = load_module(&state, project_id, module_id).await?;
    validate_dates(
        req.start_date.or(existing.start_date),
        req.target_date.or(existing.target_date),
    )
    .map_err(|msg| ApiError::field("target_date", msg))?;
    ensure_project_members(&state, project_id, req.lead_id, req.members_list.as_ref()).await?;

    Module::update(
        &state.db,
        &current.ctx,
        project_id,
        module_id,
        UpdateModule {
            name: req.name,
            description: req.description,
            start_date: req.start_date,
            target_date: req.target_date,
            status: req.status,
            lead_id: req.lead_id,
            members_list: req.members_list,
        },
    )
    .await?
    .ok_or_else(module_not_found)?;

    let detail = Module::detail(&state.db, project_id, module_id)
        .await?
        .ok_or_else(module_not_found)?;

    Ok(Json(detail))
}

pub async fn delete_module(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if !Module::delete(&state.db, scope.project_id()?, module_id).await? {
        return Err(module_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_module_issues(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<ModuleIssue>>> {
    let module = load_module(&state, scope.project_id()?, module_id).await?;
    Ok(Json(ModuleIssue::list(&state.db, module.id).await?))
}

/// Replaces the module's issue set
///
/// ```text
/// POST .../modules/{module_id}/module-issues
/// { "issues": ["...", "..."] }
/// ```
pub async fn replace_module_issues(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<ModuleIssuesRequest>,
) -> ApiResult<(StatusCode, Json<Vec<ModuleIssue>>)> {
    let project_id = scope.project_id()?;
    let module = load_module(&state, project_id, module_id).await?;

    ensure_project_issues(&state, project_id, "issues", &req.issues).await?;

    let rows = ModuleIssue::replace(&state.db, &current.ctx, &module, &req.issues).await?;

    tracing::info!(module_id = %module.id, count = rows.len(), "Module issues replaced");

    Ok((StatusCode::CREATED, Json(rows)))
}

pub async fn remove_module_issue(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, module_id, id)): Path<(String, Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let module = load_module(&state, scope.project_id()?, module_id).await?;

    if !ModuleIssue::remove(&state.db, module.id, id).await? {
        return Err(ApiError::NotFound("Module issue does not exist".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
