/// Schema migrations
///
/// The SQL files under `migrations/` at the workspace root are embedded at
/// compile time; the server applies any pending ones on startup.

use sqlx::migrate::{MigrateDatabase, MigrateError, Migrator};
use sqlx::{PgPool, Postgres};
use tracing::{error, info};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    info!(known = MIGRATOR.iter().count(), "Applying pending migrations");

    if let Err(e) = MIGRATOR.run(pool).await {
        error!(error = %e, "Schema migration failed");
        return Err(e);
    }
    Ok(())
}

/// Creates the database named in `url` if the server lacks it
///
/// Returns whether it had to be created. Local setup and the test suites use
/// this; production databases are provisioned ahead of time.
pub async fn create_database_if_missing(url: &str) -> Result<bool, sqlx::Error> {
    if Postgres::database_exists(url).await? {
        return Ok(false);
    }
    Postgres::create_database(url).await?;
    info!("Created missing database");
    Ok(true)
}
