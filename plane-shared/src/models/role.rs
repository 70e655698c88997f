/// Role ranks for workspace and project memberships
///
/// Each scope has its own ranked enumeration. The numeric scales differ
/// between scopes (workspace Admin is 15, project Admin is 20), so the two are
/// separate types and cannot be compared with each other.
///
/// | Rank | Workspace | Project |
/// |------|-----------|---------|
/// | 20   | Owner     | Admin   |
/// | 15   | Admin     | Member  |
/// | 10   | Member    | Viewer  |
/// | 5    | Guest     | Guest   |
///
/// Both are stored as `SMALLINT` and serialized as their integer rank.
///
/// # Example
///
/// ```
/// use plane_shared::models::role::{ProjectRole, WorkspaceRole};
///
/// assert!(WorkspaceRole::Owner > WorkspaceRole::Admin);
/// assert!(WorkspaceRole::Member.at_least(WorkspaceRole::Guest));
/// assert_eq!(ProjectRole::Admin.rank(), 20);
/// ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned when an integer is not a known rank
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {scope} role rank: {rank}")]
pub struct InvalidRole {
    pub scope: &'static str,
    pub rank: i16,
}

/// Rank within a workspace
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i16)]
#[serde(try_from = "i16", into = "i16")]
pub enum WorkspaceRole {
    Guest = 5,
    Member = 10,
    Admin = 15,
    Owner = 20,
}

impl WorkspaceRole {
    pub const ALL: [WorkspaceRole; 4] = [
        WorkspaceRole::Guest,
        WorkspaceRole::Member,
        WorkspaceRole::Admin,
        WorkspaceRole::Owner,
    ];

    /// Integer rank as stored in `workspace_members.role`
    pub fn rank(self) -> i16 {
        self as i16
    }

    /// Lowest defined rank; holding it is enough to count as a member
    pub fn lowest() -> Self {
        WorkspaceRole::Guest
    }

    /// True when this role ranks at or above `other`
    pub fn at_least(self, other: WorkspaceRole) -> bool {
        self >= other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Owner => "owner",
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::Member => "member",
            WorkspaceRole::Guest => "guest",
        }
    }
}

impl TryFrom<i16> for WorkspaceRole {
    type Error = InvalidRole;

    fn try_from(rank: i16) -> Result<Self, Self::Error> {
        WorkspaceRole::ALL
            .into_iter()
            .find(|role| role.rank() == rank)
            .ok_or(InvalidRole {
                scope: "workspace",
                rank,
            })
    }
}

impl From<WorkspaceRole> for i16 {
    fn from(role: WorkspaceRole) -> Self {
        role.rank()
    }
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank within a project
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i16)]
#[serde(try_from = "i16", into = "i16")]
pub enum ProjectRole {
    Guest = 5,
    Viewer = 10,
    Member = 15,
    Admin = 20,
}

impl ProjectRole {
    pub const ALL: [ProjectRole; 4] = [
        ProjectRole::Guest,
        ProjectRole::Viewer,
        ProjectRole::Member,
        ProjectRole::Admin,
    ];

    /// Integer rank as stored in `project_members.role`
    pub fn rank(self) -> i16 {
        self as i16
    }

    pub fn lowest() -> Self {
        ProjectRole::Guest
    }

    pub fn at_least(self, other: ProjectRole) -> bool {
        self >= other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Admin => "admin",
            ProjectRole::Member => "member",
            ProjectRole::Viewer => "viewer",
            ProjectRole::Guest => "guest",
        }
    }
}

impl TryFrom<i16> for ProjectRole {
    type Error = InvalidRole;

    fn try_from(rank: i16) -> Result<Self, Self::Error> {
        ProjectRole::ALL
            .into_iter()
            .find(|role| role.rank() == rank)
            .ok_or(InvalidRole {
                scope: "project",
                rank,
            })
    }
}

impl From<ProjectRole> for i16 {
    fn from(role: ProjectRole) -> Self {
        role.rank()
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_ranks() {
        assert_eq!(WorkspaceRole::Owner.rank(), 20);
        assert_eq!(WorkspaceRole::Admin.rank(), 15);
        assert_eq!(WorkspaceRole::Member.rank(), 10);
        assert_eq!(WorkspaceRole::Guest.rank(), 5);
    }

    #[test]
    fn test_project_ranks() {
        assert_eq!(ProjectRole::Admin.rank(), 20);
        assert_eq!(ProjectRole::Member.rank(), 15);
        assert_eq!(ProjectRole::Viewer.rank(), 10);
        assert_eq!(ProjectRole::Guest.rank(), 5);
    }

    #[test]
    fn test_ordering_follows_rank() {
        assert!(WorkspaceRole::Owner > WorkspaceRole::Admin);
        assert!(WorkspaceRole::Admin > WorkspaceRole::Member);
        assert!(WorkspaceRole::Member > WorkspaceRole::Guest);
        assert!(ProjectRole::Admin > ProjectRole::Member);
        assert!(ProjectRole::Viewer > ProjectRole::Guest);

        assert!(WorkspaceRole::Admin.at_least(WorkspaceRole::Member));
        assert!(!WorkspaceRole::Guest.at_least(WorkspaceRole::Member));
        assert!(ProjectRole::Member.at_least(ProjectRole::Member));
    }

    #[test]
    fn test_try_from_rank() {
        assert_eq!(WorkspaceRole::try_from(15), Ok(WorkspaceRole::Admin));
        assert_eq!(ProjectRole::try_from(15), Ok(ProjectRole::Member));
        assert!(WorkspaceRole::try_from(7).is_err());
        assert!(ProjectRole::try_from(0).is_err());
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&WorkspaceRole::Owner).unwrap();
        assert_eq!(json, "20");

        let role: ProjectRole = serde_json::from_str("10").unwrap();
        assert_eq!(role, ProjectRole::Viewer);

        assert!(serde_json::from_str::<WorkspaceRole>("12").is_err());
    }
}
