/// Role-based permission evaluation over workspace → project → entity
///
/// Every route group is registered with exactly one [`PermissionClass`]. At
/// request time the HTTP method becomes an [`Action`], the path becomes a
/// [`Scope`], and [`authorize`] decides using fresh membership lookups.
///
/// # Rules
///
/// | Class             | Read                     | Create          | Update / Delete        |
/// |-------------------|--------------------------|-----------------|------------------------|
/// | `WorkspaceBase`   | workspace member         | authenticated   | Admin+ / Owner only    |
/// | `WorkspaceAdmin`  | Admin+                   | Admin+          | Admin+                 |
/// | `WorkspaceEntity` | workspace member         | Member+         | Member+                |
/// | `ProjectBase`     | workspace member         | workspace Member+ | project Admin        |
/// | `ProjectMember`   | project member           | workspace Member+ | project Member+      |
/// | `ProjectEntity`   | project member           | project Member+ | project Member+        |
///
/// A denial is always [`AuthzError::Forbidden`]. Callers cannot tell a
/// missing membership apart from an insufficient rank.
///
/// # Example
///
/// ```
/// use plane_shared::auth::middleware::AuthContext;
/// use plane_shared::auth::permission::{
///     authorize, Action, MemoryMembershipLookup, PermissionClass, Scope,
/// };
/// use plane_shared::models::role::WorkspaceRole;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let lookup = MemoryMembershipLookup::new();
/// let (workspace, owner) = (Uuid::new_v4(), Uuid::new_v4());
/// lookup.set_workspace_role(workspace, owner, WorkspaceRole::Owner);
///
/// let identity = AuthContext::from_jwt(owner);
/// let scope = Scope::Workspace(workspace);
/// assert!(authorize(&lookup, Some(&identity), PermissionClass::WorkspaceBase, Action::Delete, scope)
///     .await
///     .is_ok());
/// # }
/// ```

use async_trait::async_trait;
use axum::http::Method;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::project::ProjectMember;
use crate::models::role::{ProjectRole, WorkspaceRole};
use crate::models::workspace::WorkspaceMember;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Membership lookup failed: {0}")]
    Lookup(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// GET, HEAD and OPTIONS are reads. Unknown methods are treated as updates.
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Action::Read,
            Method::POST => Action::Create,
            Method::DELETE => Action::Delete,
            _ => Action::Update,
        }
    }
}

/// Target of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Not under any workspace, e.g. listing or creating workspaces
    Root,
    Workspace(Uuid),
    Project { workspace_id: Uuid, project_id: Uuid },
}

impl Scope {
    pub fn workspace_id(&self) -> Option<Uuid> {
        match *self {
            Scope::Root => None,
            Scope::Workspace(id) => Some(id),
            Scope::Project { workspace_id, .. } => Some(workspace_id),
        }
    }

    pub fn project_id(&self) -> Option<Uuid> {
        match *self {
            Scope::Project { project_id, .. } => Some(project_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionClass {
    WorkspaceBase,
    WorkspaceAdmin,
    WorkspaceEntity,
    ProjectBase,
    ProjectMember,
    ProjectEntity,
}

/// Source of membership facts
///
/// Implementations must not cache across calls.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn workspace_role(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error>;

    async fn project_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error>;

    async fn in_any_project(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl MembershipLookup for PgPool {
    async fn workspace_role(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error> {
        WorkspaceMember::role_of(self, workspace_id, user_id).await
    }

    async fn project_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        ProjectMember::role_of(self, project_id, user_id).await
    }

    async fn in_any_project(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        ProjectMember::in_any_project(self, workspace_id, user_id).await
    }
}

/// In-memory membership table
#[derive(Debug, Default)]
pub struct MemoryMembershipLookup {
    workspaces: RwLock<HashMap<(Uuid, Uuid), WorkspaceRole>>,
    projects: RwLock<HashMap<(Uuid, Uuid), (Uuid, ProjectRole)>>,
}

impl MemoryMembershipLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workspace_role(&self, workspace_id: Uuid, user_id: Uuid, role: WorkspaceRole) {
        if let Ok(mut map) = self.workspaces.write() {
            map.insert((workspace_id, user_id), role);
        }
    }

    pub fn remove_workspace_member(&self, workspace_id: Uuid, user_id: Uuid) {
        if let Ok(mut map) = self.workspaces.write() {
            map.remove(&(workspace_id, user_id));
        }
    }

    pub fn set_project_role(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) {
        if let Ok(mut map) = self.projects.write() {
            map.insert((project_id, user_id), (workspace_id, role));
        }
    }

    pub fn remove_project_member(&self, project_id: Uuid, user_id: Uuid) {
        if let Ok(mut map) = self.projects.write() {
            map.remove(&(project_id, user_id));
        }
    }
}

#[async_trait]
impl MembershipLookup for MemoryMembershipLookup {
    async fn workspace_role(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error> {
        Ok(self
            .workspaces
            .read()
            .ok()
            .and_then(|map| map.get(&(workspace_id, user_id)).copied()))
    }

    async fn project_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        Ok(self
            .projects
            .read()
            .ok()
            .and_then(|map| map.get(&(project_id, user_id)).map(|(_, role)| *role)))
    }

    async fn in_any_project(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.projects.read().ok().map_or(false, |map| {
            map.iter()
                .any(|((_, member), (ws, _))| *member == user_id && *ws == workspace_id)
        }))
    }
}

fn allow_if(condition: bool) -> Result<(), AuthzError> {
    if condition {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}

async fn workspace_rank_at_least<L: MembershipLookup + ?Sized>(
    lookup: &L,
    scope: Scope,
    user_id: Uuid,
    min: WorkspaceRole,
) -> Result<(), AuthzError> {
    let workspace_id = scope.workspace_id().ok_or(AuthzError::Forbidden)?;
    let role = lookup.workspace_role(workspace_id, user_id).await?;
    allow_if(role.map_or(false, |r| r.at_least(min)))
}

async fn project_rank_at_least<L: MembershipLookup + ?Sized>(
    lookup: &L,
    scope: Scope,
    user_id: Uuid,
    min: ProjectRole,
) -> Result<(), AuthzError> {
    let project_id = scope.project_id().ok_or(AuthzError::Forbidden)?;
    let role = lookup.project_role(project_id, user_id).await?;
    allow_if(role.map_or(false, |r| r.at_least(min)))
}

/// Decides whether `identity` may perform `action` on `scope`
pub async fn authorize<L: MembershipLookup + ?Sized>(
    lookup: &L,
    identity: Option<&AuthContext>,
    class: PermissionClass,
    action: Action,
    scope: Scope,
) -> Result<(), AuthzError> {
    let identity = identity.ok_or(AuthzError::Forbidden)?;
    let user = identity.user_id;

    if let Some(workspace_id) = scope.workspace_id() {
        allow_if(identity.may_access_workspace(workspace_id))?;
    }

    match (class, action) {
        (PermissionClass::WorkspaceBase, Action::Create) => Ok(()),
        (PermissionClass::WorkspaceBase, Action::Read) if scope == Scope::Root => Ok(()),
        (PermissionClass::WorkspaceBase, Action::Read)
        | (PermissionClass::WorkspaceEntity, Action::Read)
        | (PermissionClass::ProjectBase, Action::Read) => {
            workspace_rank_at_least(lookup, scope, user, WorkspaceRole::lowest()).await
        }
        (PermissionClass::WorkspaceBase, Action::Update) => {
            workspace_rank_at_least(lookup, scope, user, WorkspaceRole::Admin).await
        }
        (PermissionClass::WorkspaceBase, Action::Delete) => {
            workspace_rank_at_least(lookup, scope, user, WorkspaceRole::Owner).await
        }

        (PermissionClass::WorkspaceAdmin, _) => {
            workspace_rank_at_least(lookup, scope, user, WorkspaceRole::Admin).await
        }

        (PermissionClass::WorkspaceEntity, _)
        | (PermissionClass::ProjectBase, Action::Create)
        | (PermissionClass::ProjectMember, Action::Create) => {
            workspace_rank_at_least(lookup, scope, user, WorkspaceRole::Member).await
        }

        (PermissionClass::ProjectBase, _) => {
            project_rank_at_least(lookup, scope, user, ProjectRole::Admin).await
        }

        (PermissionClass::ProjectMember, Action::Read) => match scope {
            Scope::Project { .. } => {
                project_rank_at_least(lookup, scope, user, ProjectRole::lowest()).await
            }
            Scope::Workspace(workspace_id) => {
                allow_if(lookup.in_any_project(workspace_id, user).await?)
            }
            Scope::Root => Err(AuthzError::Forbidden),
        },
        (PermissionClass::ProjectMember, _) => {
            project_rank_at_least(lookup, scope, user, ProjectRole::Member).await
        }

        (PermissionClass::ProjectEntity, Action::Read) => {
            project_rank_at_least(lookup, scope, user, ProjectRole::lowest()).await
        }
        (PermissionClass::ProjectEntity, _) => {
            project_rank_at_least(lookup, scope, user, ProjectRole::Member).await
        }
    }
}
