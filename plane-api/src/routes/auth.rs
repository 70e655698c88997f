/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/sign-in`: password sign-in, creates the account on first use
/// - `POST /v1/magic-generate`: mails a one-time code, returns the session key
/// - `POST /v1/magic-sign-in`: exchanges key and code for tokens
/// - `POST /v1/token/refresh`: new access token from a refresh token
/// - `POST /v1/sign-out`: revokes a refresh token
/// - `POST /v1/request-email-verify`, `GET /v1/email-verify?token=`
/// - `POST /v1/forgot-password`, `POST /v1/reset-password`
///
/// Every sign-in path returns the same [`SignInResponse`].

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::{ClientInfo, CurrentUser},
};
use axum::{
    extract::{Query, State},
    Json,
};
use plane_shared::{
    auth::{
        jwt::{self, Claims, JwtError, TokenType},
        password,
    },
    jobs::EmailJob,
    models::user::{normalize_email, CreateUser, User},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::ValidateEmail;

const MISSING_CREDENTIALS: &str = "Both email and password are required";
const INVALID_EMAIL: &str = "Please provide a valid email address.";
const WRONG_CREDENTIALS: &str =
    "Sorry, we could not find a user with the provided credentials. Please try again.";
const DEACTIVATED: &str = "Your account has been deactivated. Please contact your site administrator.";
const INVALID_RESET_TOKEN: &str = "token is not valid, please request a new one";

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct MagicGenerateRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MagicGenerateResponse {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct MagicSignInRequest {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SignOutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub new_password: String,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Trims, lowercases and validates an email address
fn checked_email(raw: &str) -> ApiResult<String> {
    let email = normalize_email(raw);
    if email.is_empty() || !email.validate_email() {
        return Err(ApiError::BadRequest(INVALID_EMAIL.to_string()));
    }
    Ok(email)
}

/// Stamps login telemetry and issues a token pair
async fn complete_sign_in(
    state: &AppState,
    user: &User,
    client: &ClientInfo,
) -> ApiResult<Json<SignInResponse>> {
    let user = User::record_login(
        &state.db,
        user.id,
        client.ip.as_deref(),
        client.user_agent.as_deref(),
    )
    .await?;

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret(), state.config.token_lifetimes())?;

    tracing::info!(user_id = %user.id, "User signed in");

    Ok(Json(SignInResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user,
    }))
}

/// Password sign-in
///
/// ```text
/// POST /v1/sign-in
/// { "email": "jane@example.com", "password": "..." }
/// ```
///
/// An unknown email creates the account with the given password.
///
/// # Errors
///
/// - `400`: missing fields or malformed email
/// - `403`: wrong password or deactivated account
pub async fn sign_in(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<SignInResponse>> {
    let (email, password) = match (req.email.as_deref(), req.password.as_deref()) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(ApiError::BadRequest(MISSING_CREDENTIALS.to_string())),
    };
    let email = checked_email(email)?;

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(user) => {
            if !password::verify_password(password, &user.password_hash)? {
                tracing::debug!(user_id = %user.id, "Sign-in rejected, wrong password");
                return Err(ApiError::Denied(WRONG_CREDENTIALS.to_string()));
            }
            if !user.is_active {
                return Err(ApiError::Denied(DEACTIVATED.to_string()));
            }
            user
        }
        None => {
            let hash = password::hash_password(password)?;
            let user = User::create(&state.db, CreateUser::new(&email, hash)).await?;
            tracing::info!(user_id = %user.id, "User signed up");
            user
        }
    };

    complete_sign_in(&state, &user, &client).await
}

/// Issues a magic sign-in code
///
/// ```text
/// POST /v1/magic-generate
/// { "email": "jane@example.com" }
/// ```
///
/// Returns `{ "key": "magic_jane@example.com" }`. The code only travels by mail.
/// A fourth request within the session lifetime is refused with `rate_limited`.
pub async fn magic_generate(
    State(state): State<AppState>,
    Json(req): Json<MagicGenerateRequest>,
) -> ApiResult<Json<MagicGenerateResponse>> {
    let email = checked_email(req.email.as_deref().unwrap_or_default())?;
    let key = state.magic_links.request(&email).await?;

    Ok(Json(MagicGenerateResponse { key }))
}

/// Signs in with a magic code
///
/// ```text
/// POST /v1/magic-sign-in
/// { "key": "magic_jane@example.com", "token": "abcd-efgh-ijkl" }
/// ```
///
/// A first-time email gets an account with an auto-set password.
pub async fn magic_sign_in(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<MagicSignInRequest>,
) -> ApiResult<Json<SignInResponse>> {
    let email = state.magic_links.verify(&req.key, &req.token).await?;

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(user) if !user.is_active => return Err(ApiError::Denied(DEACTIVATED.to_string())),
        Some(user) => user,
        None => {
            let hash = password::hash_password(&password::random_unusable_password())?;
            let user =
                User::create(&state.db, CreateUser::new(&email, hash).password_autoset()).await?;
            tracing::info!(user_id = %user.id, "User created from magic link");
            user
        }
    };

    complete_sign_in(&state, &user, &client).await
}

/// Exchanges a refresh token for a new access token
///
/// # Errors
///
/// - `401`: invalid, expired or revoked refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let revoked = state
        .revocations
        .is_revoked(claims.jti)
        .await
        .map_err(|e| ApiError::Unexpected(format!("revocation lookup failed: {}", e)))?;
    if revoked {
        return Err(ApiError::Unauthorized("Token is revoked".to_string()));
    }

    match User::find_by_id(&state.db, claims.sub).await? {
        Some(user) if user.is_active => {}
        _ => return Err(ApiError::Unauthorized("Invalid token.".to_string())),
    }

    let access_token = jwt::refresh_access_token(
        &req.refresh_token,
        state.jwt_secret(),
        state.config.token_lifetimes().access,
    )?;

    Ok(Json(RefreshResponse { access_token }))
}

/// Revokes the caller's refresh token
///
/// ```text
/// POST /v1/sign-out
/// { "refresh_token": "eyJ..." }
/// ```
pub async fn sign_out(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<SignOutRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Refresh token is required".to_string()))?;

    let claims = jwt::validate_refresh_token(&token, state.jwt_secret())?;
    if claims.sub != current.id() {
        return Err(ApiError::Unauthorized("Invalid token.".to_string()));
    }

    let remaining = claims
        .time_until_expiration()
        .and_then(|d| d.to_std().ok())
        .unwrap_or(Duration::from_secs(1));

    state
        .revocations
        .revoke(claims.jti, remaining)
        .await
        .map_err(|e| ApiError::Unexpected(format!("revocation write failed: {}", e)))?;

    User::record_logout(&state.db, current.id(), current.ctx.ip.as_deref()).await?;

    tracing::info!(user_id = %current.id(), jti = %claims.jti, "User signed out");

    Ok(MessageResponse::new("success"))
}

/// Mails an email verification link to the caller
pub async fn request_email_verify(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_id(&state.db, current.id())
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    let token = jwt::create_token(
        &Claims::new(user.id, TokenType::EmailVerification),
        state.jwt_secret(),
    )?;

    state
        .jobs
        .enqueue(EmailJob::EmailVerification {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            token,
            web_url: state.config.api.web_url.clone(),
        })
        .await?;

    Ok(MessageResponse::new("Email sent successfully"))
}

/// Confirms an email address
///
/// ```text
/// GET /v1/email-verify?token=eyJ...
/// ```
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let claims = jwt::validate_typed_token(&query.token, state.jwt_secret(), TokenType::EmailVerification)
        .map_err(|e| match e {
            JwtError::Expired => ApiError::BadRequest("Activation expired".to_string()),
            _ => ApiError::BadRequest("Invalid token".to_string()),
        })?;

    if !User::mark_email_verified(&state.db, claims.sub).await? {
        return Err(ApiError::BadRequest("Invalid token".to_string()));
    }

    tracing::info!(user_id = %claims.sub, "Email verified");

    Ok(MessageResponse::new("Successfully activated"))
}

/// Mails a password reset link
///
/// The token embeds a fingerprint of the current password hash, so it stops
/// working once the password changes.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = checked_email(&req.email)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Please check the email".to_string()))?;

    let claims = Claims::new(user.id, TokenType::PasswordReset)
        .with_fingerprint(password::password_fingerprint(&user.password_hash));
    let token = jwt::create_token(&claims, state.jwt_secret())?;

    state
        .jobs
        .enqueue(EmailJob::ForgotPassword {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            user_id: user.id,
            token,
            web_url: state.config.api.web_url.clone(),
        })
        .await?;

    Ok(MessageResponse::new("Check your email to reset your password"))
}

/// Sets a new password from a reset token
///
/// # Errors
///
/// - `401`: bad, expired or already used token
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let invalid = || ApiError::Unauthorized(INVALID_RESET_TOKEN.to_string());

    let claims = jwt::validate_typed_token(&req.token, state.jwt_secret(), TokenType::PasswordReset)
        .map_err(|_| invalid())?;

    if req.new_password.is_empty() {
        return Err(ApiError::field("new_password", "Password is required"));
    }

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid)?;

    let current = password::password_fingerprint(&user.password_hash);
    if claims.fingerprint.as_deref() != Some(current.as_str()) {
        return Err(invalid());
    }

    let hash = password::hash_password(&req.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    tracing::info!(user_id = %user.id, "Password reset");

    Ok(MessageResponse::new("Password updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_email_normalizes() {
        assert_eq!(checked_email(" Jane@Example.COM ").unwrap(), "jane@example.com");
    }

    #[test]
    fn test_checked_email_rejects_garbage() {
        for raw in ["", "   ", "not-an-email", "a@"] {
            match checked_email(raw) {
                Err(ApiError::BadRequest(msg)) => assert_eq!(msg, INVALID_EMAIL),
                other => panic!("expected bad request for {:?}, got {:?}", raw, other),
            }
        }
    }
}
