//! # Plane API Server
//!
//! Serves the REST API under `/v1`.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/plane JWT_SECRET=... cargo run -p plane-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use plane_api::{
    app::{build_router, AppState},
    config::Config,
};
use plane_shared::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
};
use plane_shared::redis::client::{RedisClient, RedisConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Plane API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = create_pool(DatabaseConfig {
        max_connections: config.database.max_connections,
        ..DatabaseConfig::with_url(config.database.url.clone())
    })
    .await?;
    run_migrations(&db).await?;
    tracing::info!("Database migrations applied");

    let redis = RedisClient::new(RedisConfig::from_env()?).await?;

    let address = config.bind_address();
    let state = AppState::new(db, config, redis)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plane_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
