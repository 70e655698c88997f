/// Bearer authentication
///
/// [`require_auth`] resolves `Authorization: Bearer <token>` (a JWT access
/// token or a `plane_api_` token) into an [`AuthContext`] request extension.
/// Handlers pick it up through [`CurrentUser`], which also carries the
/// [`RequestContext`] used to stamp writes.

use crate::{app::AppState, error::ApiError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use plane_shared::auth::middleware::{authenticate_bearer, bearer_token, AuthContext};
use plane_shared::context::RequestContext;

/// Rejects requests without valid credentials
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?.to_string();
    let identity = authenticate_bearer(&state.db, state.jwt_secret(), &token).await?;

    tracing::debug!(user_id = %identity.user_id, method = ?identity.method, "Request authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// First address in `X-Forwarded-For`, if any
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Authenticated caller plus the context for audit stamping
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: AuthContext,
    pub ctx: RequestContext,
}

impl CurrentUser {
    pub fn id(&self) -> uuid::Uuid {
        self.identity.user_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let mut ctx = RequestContext::new(identity.user_id);
        if let Some(ip) = client_ip(&parts.headers) {
            ctx = ctx.with_ip(ip);
        }
        if let Some(agent) = user_agent(&parts.headers) {
            ctx = ctx.with_user_agent(agent);
        }

        Ok(Self { identity, ctx })
    }
}

/// Client details for unauthenticated endpoints
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            ip: client_ip(&parts.headers),
            user_agent: user_agent(&parts.headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        assert!(client_ip(&headers).is_none());

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn test_current_user_requires_identity() {
        let request = axum::http::Request::builder()
            .uri("/")
            .header(header::USER_AGENT, "curl/8.0")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let rejected = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(rejected, Err(ApiError::Unauthorized(_))));

        let user_id = uuid::Uuid::new_v4();
        parts.extensions.insert(AuthContext::from_jwt(user_id));
        let current = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(current.id(), user_id);
        assert_eq!(current.ctx.user_agent.as_deref(), Some("curl/8.0"));
    }
}
