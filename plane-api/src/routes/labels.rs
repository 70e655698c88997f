/// Project labels
///
/// `/v1/workspaces/:slug/projects/:project_id/labels[/:label_id]`

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
use plane_shared::models::label::{CreateLabel, Label, UpdateLabel};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLabelRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[validate(custom(function = "validate_color"))]
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLabelRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,

    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
}

/// Empty, or `#` followed by six hex digits
fn validate_color(color: &str) -> Result<(), ValidationError> {
    if color.is_empty() {
        return Ok(());
    }
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("color");
        err.message = Some("Color must look like #3a7bd5".into());
        Err(err)
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Label does not exist".to_string())
}

pub async fn list_labels(
    State(state): State<AppState>,
    scope: ResolvedScope,
) -> ApiResult<Json<Vec<Label>>> {
    Ok(Json(Label::list(&state.db, scope.project_id()?).await?))
}

pub async fn create_label(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Json(req): Json<CreateLabelRequest>,
) -> ApiResult<(StatusCode, Json<Label>)> {
    let req = validated(req)?;

    let label = Label::create(
        &state.db,
        &current.ctx,
        scope.workspace_id()?,
        scope.project_id()?,
        CreateLabel {
            name: req.name,
            description: req.description,
            color: req.color,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(label)))
}

pub async fn get_label(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<Json<Label>> {
    let label = Label::find(&state.db, scope.project_id()?, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(label))
}

pub async fn update_label(
    State(state): State<AppState>,
    current: CurrentUser,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<UpdateLabelRequest>,
) -> ApiResult<Json<Label>> {
    let req = validated(req)?;

    let label = Label::update(
        &state.db,
        &current.ctx,
        scope.project_id()?,
        id,
        UpdateLabel {
            name: req.name,
            description: req.description,
            color: req.color,
        },
    )
    .await?
    .ok_or_else(not_found)?;

    Ok(Json(label))
}

pub async fn delete_label(
    State(state): State<AppState>,
    scope: ResolvedScope,
    Path((_slug, _project_id, id)): Path<(String, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if !Label::delete(&state.db, scope.project_id()?, id).await? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_validation() {
        assert!(validate_color("").is_ok());
        assert!(validate_color("#003773").is_ok());
        assert!(validate_color("#ABCDEF").is_ok());
        assert!(validate_color("003773").is_err());
        assert!(validate_color("#00377").is_err());
        assert!(validate_color("#00377g").is_err());
    }

    #[test]
    fn test_update_request_validates_color() {
        let req = UpdateLabelRequest {
            name: None,
            description: None,
            color: Some("red".to_string()),
        };
        assert!(req.validate().is_err());
    }
}
