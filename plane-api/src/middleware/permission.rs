/// Per-route-group permission guard
///
/// Each guarded router is registered with exactly one [`PermissionClass`]:
///
/// ```text
/// router.route_layer(from_fn_with_state(PermissionGuard::new(state, class), guard))
/// ```
///
/// The guard turns `:slug` and `:project_id` into a [`Scope`], runs
/// [`authorize`] and stores the resolved workspace in a [`ResolvedScope`]
/// extension. An unknown slug, a malformed project id and a project from
/// another workspace are all reported as `Forbidden`, like any denial.

use crate::{app::AppState, error::ApiError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use plane_shared::auth::middleware::AuthContext;
use plane_shared::auth::permission::{authorize, Action, PermissionClass, Scope};
use plane_shared::models::project::Project;
use plane_shared::models::workspace::Workspace;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct PermissionGuard {
    state: AppState,
    class: PermissionClass,
}

impl PermissionGuard {
    pub fn new(state: AppState, class: PermissionClass) -> Self {
        Self { state, class }
    }
}

/// Workspace and project a guarded request resolved to
#[derive(Debug, Clone)]
pub struct ResolvedScope {
    pub workspace: Option<Workspace>,
    pub project_id: Option<Uuid>,
}

impl ResolvedScope {
    pub fn workspace(&self) -> Result<&Workspace, ApiError> {
        self.workspace.as_ref().ok_or(ApiError::Forbidden)
    }

    pub fn workspace_id(&self) -> Result<Uuid, ApiError> {
        self.workspace().map(|w| w.id)
    }

    pub fn project_id(&self) -> Result<Uuid, ApiError> {
        self.project_id.ok_or(ApiError::Forbidden)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ResolvedScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedScope>()
            .cloned()
            .ok_or(ApiError::Forbidden)
    }
}

pub async fn guard(
    State(guard): State<PermissionGuard>,
    params: Option<Path<HashMap<String, String>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let state = &guard.state;
    let params = params.map(|Path(p)| p).unwrap_or_default();

    let workspace = match params.get("slug") {
        Some(slug) => Some(
            Workspace::find_by_slug(&state.db, slug)
                .await?
                .ok_or(ApiError::Forbidden)?,
        ),
        None => None,
    };

    let project_id = match (&workspace, params.get("project_id")) {
        (Some(workspace), Some(raw)) => {
            let project_id = Uuid::parse_str(raw).map_err(|_| ApiError::Forbidden)?;
            if !Project::belongs_to(&state.db, workspace.id, project_id).await? {
                return Err(ApiError::Forbidden);
            }
            Some(project_id)
        }
        _ => None,
    };

    let scope = match (&workspace, project_id) {
        (Some(workspace), Some(project_id)) => Scope::Project {
            workspace_id: workspace.id,
            project_id,
        },
        (Some(workspace), None) => Scope::Workspace(workspace.id),
        _ => Scope::Root,
    };

    let action = Action::from_method(req.method());
    let identity = req.extensions().get::<AuthContext>().cloned();

    if let Err(err) = authorize(
        state.membership.as_ref(),
        identity.as_ref(),
        guard.class,
        action,
        scope,
    )
    .await
    {
        tracing::debug!(class = ?guard.class, ?action, ?scope, "Permission denied");
        return Err(err.into());
    }

    req.extensions_mut().insert(ResolvedScope {
        workspace,
        project_id,
    });
    Ok(next.run(req).await)
}
