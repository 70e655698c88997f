//! # Plane Shared Library
//!
//! Domain types, persistence and business rules shared by the Plane API
//! server and the email worker.
//!
//! ## Module Organization
//!
//! - `models`: database models and queries
//! - `auth`: passwords, JWTs, API tokens, magic links and the permission evaluator
//! - `context`: request actor threaded through write paths
//! - `db`: connection pool and migrations
//! - `redis`: Redis connection management
//! - `jobs`: background email job queue
//! - `github`: GitHub App REST client
//! - `sync`: integration install and repository sync bridge
//! - `storage`: uploaded file storage

pub mod auth;
pub mod context;
pub mod db;
pub mod github;
pub mod jobs;
pub mod models;
pub mod redis;
pub mod storage;
pub mod sync;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
