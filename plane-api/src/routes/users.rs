/// The caller's own profile
///
/// # Endpoints
///
/// - `GET /v1/users/me`
/// - `PATCH /v1/users/me`
/// - `POST /v1/users/me/change-password`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::CurrentUser,
    routes::{auth::MessageResponse, validated},
};
use axum::{extract::State, Json};
use plane_shared::{
    auth::password,
    models::user::{UpdateUser, User},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 255, message = "First name must be at most 255 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 255, message = "Last name must be at most 255 characters"))]
    pub last_name: Option<String>,

    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[serde(default)]
    pub new_password: String,
}

pub async fn me(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, current.id())
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    Ok(Json(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let req = validated(req)?;

    let user = User::update(
        &state.db,
        current.id(),
        UpdateUser {
            first_name: req.first_name,
            last_name: req.last_name,
            avatar: req.avatar,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    Ok(Json(user))
}

/// Changes the password after checking the old one
///
/// Clears `is_password_autoset` on success.
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let req = validated(req)?;

    let user = User::find_by_id(&state.db, current.id())
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    if !password::verify_password(&req.old_password, &user.password_hash)? {
        return Err(ApiError::field("old_password", "Wrong password."));
    }

    let hash = password::hash_password(&req.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(MessageResponse::new("Password updated successfully"))
}
