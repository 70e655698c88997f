//! # Plane Worker
//!
//! Drains the email job queue in Redis and sends each message through the
//! configured transport.
//!
//! ## Usage
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379 WORKER_TRANSPORT=log cargo run -p plane-worker
//! ```

use plane_shared::jobs::RedisJobQueue;
use plane_shared::redis::{RedisClient, RedisConfig};
use plane_worker::config::{Transport, WorkerConfig};
use plane_worker::dispatcher::Dispatcher;
use plane_worker::mailer::{HttpMailer, LogMailer, Mailer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Plane Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::load()?;

    let mailer: Arc<dyn Mailer> = match config.transport {
        Transport::Log => Arc::new(LogMailer),
        Transport::Http => {
            let url = config
                .relay_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("WORKER_RELAY_URL is required"))?;
            Arc::new(HttpMailer::new(
                url,
                Duration::from_secs(config.relay_timeout_secs),
            )?)
        }
    };

    let redis = RedisClient::new(RedisConfig::from_env()?).await?;
    let queue = Arc::new(RedisJobQueue::new(redis, config.queue_key.clone()));

    let dispatcher = Dispatcher::new(queue, mailer, config);
    tokio::spawn(cancel_on_signal(dispatcher.shutdown_token()));

    let stats = dispatcher.run().await;
    tracing::info!(sent = stats.sent, failed = stats.failed, "Worker stopped");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plane_worker=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
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
    token.cancel();
}
