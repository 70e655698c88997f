/// Cycles, cycle issues and favorites
///
/// Under `/v1/workspaces/:slug/projects/:project_id`:
///
/// - `GET|POST /cycles`, `GET|PATCH|DELETE /cycles/:cycle_id`
/// - `GET|POST /cycles/:cycle_id/cycle-issues`, `DELETE /cycles/:cycle_id/cycle-issues/:id`
/// - `GET|POST /user-favorite-cycles`, `DELETE /user-favorite-cycles/:cycle_id`
///
/// An issue sits in at most one cycle; adding it to another moves it.

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
use plane_shared::models::cycle::{
    validate_dates, CreateCycle, Cycle, CycleFavorite, CycleIssue, UpdateCycle,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCycleRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCycleRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CycleIssuesRequest {
    #[serde(default)]
    pub issues: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub cycle: Uuid,
}

fn cycle_not_found() -> ApiError {
    ApiError::NotFound("Cycle does not exist".to_string())
}

async fn load_cycle(state: &AppState, project_id: Uuid, cycle_id: Uuid) -> ApiResult<Cycle> {
    Cycle::find(&state.db, project_id, cycle_id)
        .await?
        .ok_or_else(cycle_not_found)
}

pub async fn list_cycles(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<Cycle>>> {
    Ok(Json(Cycle::list(&state.db, scope.project_id()?).await?))
}

pub async fn create_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<CreateCycleRequest>,
) -> ApiResult<(StatusCode, Json<Cycle>)> {
    let req = validated(req)?;
    validate_dates(req.start_date, req.end_date).map_err(|msg| ApiError::field("end_date", msg))?;

    let cycle = Cycle::create(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        scope.project_id()?,
        CreateCycle {
            name: req.name,
            description: req.description,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(cycle)))
}

pub async fn get_cycle(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Cycle>> {
    Ok(Json(load_cycle(&state, scope.project_id()?, cycle_id).await?))
}

pub async fn update_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<UpdateCycleRequest>,
) -> ApiResult<Json<Cycle>> {
    let req = validated(req)?;
    let project_id = scope.project_id()?;

    let existing = load_cycle(&state, project_id, cycle_id).await?;
    validate_dates(
        req.start_date.or(existing.start_date),
        req.end_date.or(existing.end_date),
    )
    .map_err(|msg| ApiError::field("end_date", msg))?;

    let cycle = Cycle::update(
        &state.db,
        &current.ctx,
        project_id,
        cycle_id,
        UpdateCycle {
            name: req.name,
            description: req.description,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?
    .ok_or_else(cycle_not_found)?;

    Ok(Json(cycle))
}

pub async fn delete_cycle(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if !Cycle::delete(&state.db, scope.project_id()?, cycle_id).await? {
        return Err(cycle_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_cycle_issues(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Vec<CycleIssue>>> {
    let cycle = load_cycle(&state, scope.project_id()?, cycle_id).await?;
    Ok(Json(CycleIssue::list(&state.db, cycle.id).await?))
}

/// Moves issues into the cycle
///
/// ```text
/// POST .../cycles/{cycle_id}/cycle-issues
/// { "issues": ["...", "..."] }
/// ```
pub async fn add_cycle_issues(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<CycleIssuesRequest>,
) -> ApiResult<(StatusCode, Json<Vec<CycleIssue>>)> {
    let project_id = scope.project_id()?;
    let cycle = load_cycle(&state, project_id, cycle_id).await?;

    if req.issues.is_empty() {
        return Err(ApiError::field("issues", "Issues are required"));
    }
    ensure_project_issues(&state, project_id, "issues", &req.issues).await?;

    let rows = CycleIssue::add_issues(&state.db, &current.ctx, &cycle, &req.issues).await?;

    tracing::info!(cycle_id = %cycle.id, count = rows.len(), "Issues added to cycle");

    Ok((StatusCode::CREATED, Json(rows)))
}

pub async fn remove_cycle_issue(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id, id)): Path<(String, Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let cycle = load_cycle(&state, scope.project_id()?, cycle_id).await?;

    if !CycleIssue::remove(&state.db, cycle.id, id).await? {
        return Err(ApiError::NotFound("Cycle issue does not exist".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_favorites(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<CycleFavorite>>> {
    let favorites = CycleFavorite::list_for_user(&state.db, scope.project_id()?, current.id()).await?;
    Ok(Json(favorites))
}

/// Marks a cycle as favorite; a second add is 409
pub async fn add_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<FavoriteRequest>,
) -> ApiResult<(StatusCode, Json<CycleFavorite>)> {
    let cycle = load_cycle(&state, scope.project_id()?, req.cycle).await?;
    let favorite = CycleFavorite::create(&state.db, &current.ctx, &cycle).await?;

    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, cycle_id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let cycle = load_cycle(&state, scope.project_id()?, cycle_id).await?;

    if !CycleFavorite::delete(&state.db, cycle.id, current.id()).await? {
        return Err(ApiError::NotFound("Cycle is not a favorite".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
