/// Personal API tokens
///
/// # Endpoints
///
/// - `POST /v1/api-tokens`: create (plaintext returned once)
/// - `GET /v1/api-tokens`: list the caller's tokens
/// - `DELETE /v1/api-tokens/:id`
///
/// Tokens authenticate as `Authorization: Bearer plane_api_...`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::CurrentUser,
    routes::validated,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use plane_shared::models::{
    api_token::{ApiToken, CreateApiToken, TokenUserType},
    workspace::{Workspace, WorkspaceMember},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiTokenRequest {
    /// Defaults to a random hex label
    #[validate(length(max = 255, message = "Label must be at most 255 characters"))]
    pub label: Option<String>,

    /// Slug of a workspace to restrict the token to
    pub workspace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateApiTokenResponse {
    #[serde(flatten)]
    pub token: ApiToken,

    /// Only ever returned here
    pub secret: String,
}

/// Creates a token
///
/// ```text
/// POST /v1/api-tokens
/// { "label": "ci", "workspace": "acme" }
/// ```
///
/// # Errors
///
/// - `403`: the caller is not a member of the named workspace
pub async fn create_api_token(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreateApiTokenRequest>,
) -> ApiResult<(StatusCode, Json<CreateApiTokenResponse>)> {
    let req = validated(req)?;

    let workspace_id = match req.workspace.as_deref() {
        Some(slug) => {
            let workspace = Workspace::find_by_slug(&state.db, slug)
                .await?
                .ok_or(ApiError::Forbidden)?;
            if WorkspaceMember::role_of(&state.db, workspace.id, current.id())
                .await?
                .is_none()
            {
                return Err(ApiError::Forbidden);
            }
            Some(workspace.id)
        }
        None => None,
    };

    let (token, secret) = ApiToken::create(
        &state.db,
        CreateApiToken {
            user_id: current.id(),
            workspace_id,
            label: req.label,
            user_type: TokenUserType::Human,
            created_by: Some(current.id()),
        },
    )
    .await?;

    tracing::info!(user_id = %current.id(), token_id = %token.id, "API token created");

    Ok((StatusCode::CREATED, Json(CreateApiTokenResponse { token, secret })))
}

pub async fn list_api_tokens(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<Vec<ApiToken>>> {
    let tokens = ApiToken::list_for_user(&state.db, current.id()).await?;
    Ok(Json(tokens))
}

pub async fn delete_api_token(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !ApiToken::delete_for_user(&state.db, current.id(), id).await? {
        return Err(ApiError::NotFound("API token does not exist".to_string()));
    }

    tracing::info!(user_id = %current.id(), token_id = %id, "API token deleted");

    Ok(StatusCode::NO_CONTENT)
}
