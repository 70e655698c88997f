//! # Plane API Server Library
//!
//! HTTP surface for workspaces, projects, issues, cycles, modules, labels,
//! file assets, API tokens and integrations.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Authentication, permission guards, security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
