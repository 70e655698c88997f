/// Database layer
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded migration runner
///
/// Models live in [`crate::models`].

pub mod migrations;
pub mod pool;
