/// Middleware for the API server
///
/// - `auth`: bearer authentication and the `CurrentUser` extractor
/// - `permission`: per-route-group permission guard
/// - `security`: security response headers

pub mod auth;
pub mod permission;
pub mod security;
