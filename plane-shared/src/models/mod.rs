/// Database models for Plane
///
/// Each model owns its SQL. Writes take a [`RequestContext`](crate::context::RequestContext)
/// for audit stamping, and multi-row replace sequences run inside a single
/// transaction.
///
/// # Models
///
/// - `role`: Workspace and project rank enumerations
/// - `user`: User accounts (human and bot)
/// - `workspace`: Workspaces and workspace memberships
/// - `project`: Projects, identifier claims and project memberships
/// - `label`: Project labels
/// - `issue`: Issues with assignees, labels, blockers, links, comments and activity
/// - `cycle`: Cycles, cycle issues and cycle favorites
/// - `module`: Modules, module members and module issues
/// - `api_token`: Opaque bearer tokens for humans and bots
/// - `integration`: Provider catalogue and per-workspace installs
/// - `github`: Repository, issue and comment sync linkage
/// - `file_asset`: Uploaded file metadata

pub mod api_token;
pub mod cycle;
pub mod file_asset;
pub mod github;
pub mod integration;
pub mod issue;
pub mod label;
pub mod module;
pub mod project;
pub mod role;
pub mod user;
pub mod workspace;

/// Rows per multi-row insert; keeps statements well under the bind limit
pub const BULK_CHUNK_SIZE: usize = 100;

/// True when `err` is a unique violation of the named constraint
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
