//! # Plane Worker Library
//!
//! Background email delivery for the API.
//!
//! ## Modules
//!
//! - `config`: `WORKER_*` settings
//! - `dispatcher`: queue loop and concurrent sends
//! - `mailer`: mail transports (log, HTTP relay)
//! - `render`: plain-text messages per job kind

pub mod config;
pub mod dispatcher;
pub mod mailer;
pub mod render;
