/// Error handling for the API server
///
/// Every handler returns [`ApiResult`]. Library errors convert through the
/// `From` impls below, so handlers use `?` and the response body is always
///
/// ```json
/// { "error": "<code>", "message": "<text>", "details": [ ... ] }
/// ```
///
/// # Example
///
/// ```
/// use plane_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(name: String) -> ApiResult<Json<serde_json::Value>> {
///     if name.is_empty() {
///         return Err(ApiError::BadRequest("Name is required".to_string()));
///     }
///     Ok(Json(json!({ "name": name })))
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use plane_shared::auth::jwt::JwtError;
use plane_shared::auth::magic_link::{MagicLinkError, MAGIC_LINK_TTL};
use plane_shared::auth::middleware::AuthError;
use plane_shared::auth::password::PasswordError;
use plane_shared::auth::permission::AuthzError;
use plane_shared::github::GithubError;
use plane_shared::jobs::JobError;
use plane_shared::models::project::ProjectError;
use plane_shared::storage::StorageError;
use plane_shared::sync::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

/// Message returned for every permission denial
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";

/// Message returned for unexpected failures
pub const UNEXPECTED_MESSAGE: &str = "Something went wrong please try again later";

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 400 with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// 401
    Unauthorized(String),

    /// 403, always with [`FORBIDDEN_MESSAGE`]
    Forbidden,

    /// 403 with a flow-specific message (sign-in refusals)
    Denied(String),

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 410
    Gone(String),

    /// 400 with a `Retry-After` header
    RateLimited { retry_after: u64, message: String },

    /// Logged, then reported as a generic 400
    Unexpected(String),

    /// 502, a remote service failed
    BadGateway(String),

    /// 503
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }

    /// Maps `validator` output into field details
    pub fn from_validation(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field)),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden => write!(f, "Forbidden: {}", FORBIDDEN_MESSAGE),
            ApiError::Denied(msg) => write!(f, "Denied: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Gone(msg) => write!(f, "Gone: {}", msg),
            ApiError::RateLimited { message, .. } => write!(f, "Rate limited: {}", message),
            ApiError::Unexpected(msg) => write!(f, "Unexpected error: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::ValidationError(errors) => {
                let message = errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Request validation failed".to_string());
                (StatusCode::BAD_REQUEST, "validation_error", message, Some(errors))
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                FORBIDDEN_MESSAGE.to_string(),
                None,
            ),
            ApiError::Denied(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg, None),
            ApiError::Unexpected(msg) => {
                tracing::error!(error = %msg, "Unexpected error");
                (
                    StatusCode::BAD_REQUEST,
                    "unexpected",
                    UNEXPECTED_MESSAGE.to_string(),
                    None,
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::error!(error = %msg, "Upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "bad_gateway",
                    UNEXPECTED_MESSAGE.to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
            ApiError::RateLimited {
                retry_after: seconds,
                message,
            } => {
                retry_after = Some(seconds);
                (StatusCode::BAD_REQUEST, "rate_limited", message, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// Message for a known unique constraint
fn conflict_message(constraint: &str) -> String {
    match constraint {
        "workspaces_slug_key" => "Slug is already taken".to_string(),
        "project_identifiers_workspace_name_key" => "Project Identifier is taken".to_string(),
        "projects_workspace_name_key" => "Project name is already taken".to_string(),
        "cycle_favorites_cycle_user_key" => "Cycle is already added to favorites".to_string(),
        "users_email_key" => "Email already exists".to_string(),
        "modules_project_name_key" => "Module with the same name already exists".to_string(),
        "labels_project_name_key" => "Label with the same name already exists".to_string(),
        "workspace_members_workspace_member_key" => {
            "User is already a member of the workspace".to_string()
        }
        "project_members_project_member_key" => {
            "User is already a member of the project".to_string()
        }
        other => format!("Constraint violation: {}", other),
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::Conflict(conflict_message(db_err.constraint().unwrap_or_default()))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                ApiError::BadRequest("Referenced object does not exist".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is unavailable".to_string())
            }
            other => ApiError::Unexpected(format!("Database error: {}", other)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => {
                ApiError::Unauthorized(msg)
            }
            AuthError::Inactive => ApiError::Unauthorized(err.to_string()),
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden => ApiError::Forbidden,
            AuthzError::Lookup(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Unexpected(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::CreateError(msg) => ApiError::Unexpected(msg),
            _ => ApiError::Unauthorized("Invalid token.".to_string()),
        }
    }
}

impl From<MagicLinkError> for ApiError {
    fn from(err: MagicLinkError) -> Self {
        match err {
            MagicLinkError::Exhausted => ApiError::RateLimited {
                retry_after: MAGIC_LINK_TTL.as_secs(),
                message: err.to_string(),
            },
            MagicLinkError::Expired | MagicLinkError::IncorrectCode | MagicLinkError::MissingFields => {
                ApiError::BadRequest(err.to_string())
            }
            MagicLinkError::Store(e) => ApiError::Unexpected(format!("Session store error: {}", e)),
            MagicLinkError::Malformed(e) => ApiError::Unexpected(format!("Malformed session: {}", e)),
            MagicLinkError::Queue(e) => e.into(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::Unexpected(format!("Failed to enqueue email: {}", err))
    }
}

impl From<ProjectError> for ApiError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::IdentifierRequired | ProjectError::IdentifierTooLong => {
                ApiError::field("identifier", err.to_string())
            }
            ProjectError::IdentifierTaken
            | ProjectError::IdentifierAlreadyTaken
            | ProjectError::NameTaken => ApiError::Conflict(err.to_string()),
            ProjectError::NotFound => ApiError::NotFound(err.to_string()),
            ProjectError::Database(e) => e.into(),
        }
    }
}

impl From<GithubError> for ApiError {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::NotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::MissingInstallationId
            | SyncError::MissingRepositoryFields
            | SyncError::NotGithub
            | SyncError::MissingMetadata(_) => ApiError::BadRequest(err.to_string()),
            SyncError::AlreadyActive => ApiError::Gone(err.to_string()),
            SyncError::IntegrationNotFound
            | SyncError::WorkspaceIntegrationNotFound
            | SyncError::ProjectNotFound
            | SyncError::RepositorySyncNotFound
            | SyncError::IssueSyncNotFound
            | SyncError::IssueNotFound
            | SyncError::CommentNotFound => ApiError::NotFound(err.to_string()),
            SyncError::Remote(e) => e.into(),
            SyncError::Password(e) => e.into(),
            SyncError::Database(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TooLarge { .. } => ApiError::field("asset", err.to_string()),
            StorageError::NotFound => ApiError::NotFound("File does not exist".to_string()),
            StorageError::InvalidKey => ApiError::BadRequest("Invalid asset key".to_string()),
            StorageError::Io(e) => ApiError::Unexpected(format!("Storage error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Issue not found".to_string());
        assert_eq!(err.to_string(), "Not found: Issue not found");
    }

    #[tokio::test]
    async fn test_forbidden_has_fixed_message() {
        let response = ApiError::from(AuthzError::Forbidden).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "forbidden");
        assert_eq!(body["message"], FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_exhausted_magic_link_is_rate_limited() {
        let response = ApiError::from(MagicLinkError::Exhausted).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::RETRY_AFTER], "600");

        let body = body_json(response).await;
        assert_eq!(body["error"], "rate_limited");
        assert_eq!(body["message"], "Max attempts exhausted. Please try again later.");
    }

    #[tokio::test]
    async fn test_unexpected_hides_detail() {
        let response = ApiError::Unexpected("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], UNEXPECTED_MESSAGE);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_validation_error() {
        let err = StorageError::TooLarge {
            size: 6 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["details"][0]["field"], "asset");
        assert_eq!(body["details"][0]["message"], "File size limit is 5MB");
    }

    #[test]
    fn test_sync_error_mapping() {
        assert!(matches!(ApiError::from(SyncError::AlreadyActive), ApiError::Gone(_)));
        assert!(matches!(
            ApiError::from(SyncError::MissingInstallationId),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(SyncError::WorkspaceIntegrationNotFound),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(SyncError::Remote(GithubError::Response("boom".to_string()))),
            ApiError::BadGateway(_)
        ));
    }

    #[test]
    fn test_project_error_mapping() {
        assert!(matches!(
            ApiError::from(ProjectError::IdentifierTaken),
            ApiError::Conflict(msg) if msg == "Project Identifier is taken"
        ));
        assert!(matches!(
            ApiError::from(ProjectError::IdentifierRequired),
            ApiError::ValidationError(_)
        ));
    }

    #[test]
    fn test_conflict_messages() {
        assert_eq!(conflict_message("workspaces_slug_key"), "Slug is already taken");
        assert_eq!(
            conflict_message("cycle_favorites_cycle_user_key"),
            "Cycle is already added to favorites"
        );
    }
}
