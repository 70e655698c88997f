/// Request authentication for Axum
///
/// Bearer credentials come in two shapes:
///
/// - a JWT access token, validated locally
/// - an API token (`plane_api_…`), looked up by hash
///
/// Either way the owning user must exist and be active. A successful check
/// yields an [`AuthContext`], which the API inserts into request extensions.
///
/// # Example
///
/// ```no_run
/// use axum::{extract::Request, middleware::Next, response::Response};
/// use plane_shared::auth::middleware::{authenticate_bearer, bearer_token, AuthError};
/// use sqlx::PgPool;
///
/// async fn layer(pool: PgPool, secret: String, mut req: Request, next: Next)
///     -> Result<Response, AuthError>
/// {
///     let token = bearer_token(req.headers())?;
///     let auth = authenticate_bearer(&pool, &secret, token).await?;
///     req.extensions_mut().insert(auth);
///     Ok(next.run(req).await)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::api_token::is_api_token;
use super::jwt::{validate_access_token, JwtError};
use crate::models::api_token::ApiToken;
use crate::models::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiToken,
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub method: AuthMethod,

    /// Set for API token authentication
    pub api_token_id: Option<Uuid>,

    /// Workspace an API token is restricted to
    pub workspace_id: Option<Uuid>,

    pub is_bot: bool,
}

impl AuthContext {
    pub fn from_jwt(user_id: Uuid) -> Self {
        Self {
            user_id,
            method: AuthMethod::Jwt,
            api_token_id: None,
            workspace_id: None,
            is_bot: false,
        }
    }

    pub fn from_api_token(token: &ApiToken) -> Self {
        Self {
            user_id: token.user_id,
            method: AuthMethod::ApiToken,
            api_token_id: Some(token.id),
            workspace_id: token.workspace_id,
            is_bot: token.user_type == crate::models::api_token::TokenUserType::Bot,
        }
    }

    /// False when the credential is bound to a different workspace
    pub fn may_access_workspace(&self, workspace_id: Uuid) -> bool {
        self.workspace_id.map_or(true, |bound| bound == workspace_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided.")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("User inactive or deleted.")]
    Inactive,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extracts the value of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Resolves a bearer value into an [`AuthContext`]
pub async fn authenticate_bearer(
    pool: &PgPool,
    secret: &str,
    token: &str,
) -> Result<AuthContext, AuthError> {
    let context = if is_api_token(token) {
        let api_token = ApiToken::authenticate(pool, token)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("Invalid token.".to_string()))?;
        AuthContext::from_api_token(&api_token)
    } else {
        let claims = validate_access_token(token, secret).map_err(|e| match e {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            _ => AuthError::InvalidToken("Invalid token.".to_string()),
        })?;
        AuthContext::from_jwt(claims.sub)
    };

    let user = User::find_by_id(pool, context.user_id)
        .await?
        .ok_or(AuthError::Inactive)?;
    if !user.is_active {
        return Err(AuthError::Inactive);
    }

    Ok(AuthContext {
        is_bot: user.is_bot,
        ..context
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_auth_context_from_jwt() {
        let user_id = Uuid::new_v4();
        let context = AuthContext::from_jwt(user_id);

        assert_eq!(context.user_id, user_id);
        assert_eq!(context.method, AuthMethod::Jwt);
        assert!(context.api_token_id.is_none());
        assert!(context.may_access_workspace(Uuid::new_v4()));
    }

    #[test]
    fn test_workspace_binding() {
        let bound = Uuid::new_v4();
        let context = AuthContext {
            user_id: Uuid::new_v4(),
            method: AuthMethod::ApiToken,
            api_token_id: Some(Uuid::new_v4()),
            workspace_id: Some(bound),
            is_bot: true,
        };

        assert!(context.may_access_workspace(bound));
        assert!(!context.may_access_workspace(Uuid::new_v4()));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingCredentials)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
