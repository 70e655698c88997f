/// API route handlers
///
/// Handlers are grouped by resource:
///
/// - `health`: health check
/// - `auth`: password and magic-link sign-in, sign-out, refresh, email verification, password reset
/// - `users`: the caller's profile and password
/// - `api_tokens`: personal API tokens
/// - `workspaces`: workspaces and workspace members
/// - `projects`: projects, identifiers and project members
/// - `issues`: issues with comments, links and activity
/// - `labels`, `cycles`, `modules`: project entities
/// - `assets`: uploaded files
/// - `integrations`: integration catalogue, installs and GitHub sync

pub mod api_tokens;
pub mod assets;
pub mod auth;
pub mod cycles;
pub mod health;
pub mod integrations;
pub mod issues;
pub mod labels;
pub mod modules;
pub mod projects;
pub mod users;
pub mod workspaces;

use crate::error::ApiError;
use serde::de::DeserializeOwned;
use validator::Validate;

/// Runs `validator` rules on a request body
pub(crate) fn validated<T: Validate>(req: T) -> Result<T, ApiError> {
    req.validate().map_err(ApiError::from_validation)?;
    Ok(req)
}

/// Parses an optional JSON text field from a multipart form
pub(crate) fn parse_json_field<T: DeserializeOwned + Default>(
    raw: Option<&str>,
    field: &str,
) -> Result<T, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => serde_json::from_str(text)
            .map_err(|_| ApiError::field(field, format!("{} must be valid JSON", field))),
        None => Ok(T::default()),
    }
}
