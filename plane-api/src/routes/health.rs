/// `GET /health`
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "database": "connected", "redis": "connected" }
/// ```
///
/// Always answers 200; a failed dependency turns `status` into `degraded`.
/// `redis` reads `disabled` when the server runs on in-process stores.

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    Connected,
    Disconnected,
    Disabled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: Dependency,
    pub redis: Dependency,
}

impl HealthResponse {
    fn new(database: Dependency, redis: Dependency) -> Self {
        let degraded = database != Dependency::Connected || redis == Dependency::Disconnected;
        Self {
            status: if degraded { "degraded" } else { "healthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            redis,
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match plane_shared::db::pool::ping(&state.db).await {
        Ok(()) => Dependency::Connected,
        Err(e) => {
            tracing::warn!(error = %e, "PostgreSQL unreachable");
            Dependency::Disconnected
        }
    };

    let redis = match &state.redis {
        None => Dependency::Disabled,
        Some(client) => match client.ping().await {
            Ok(true) => Dependency::Connected,
            Ok(false) => Dependency::Disconnected,
            Err(e) => {
                tracing::warn!(error = %e, "Redis unreachable");
                Dependency::Disconnected
            }
        },
    };

    Json(HealthResponse::new(database, redis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_redis_is_not_degraded() {
        let health = HealthResponse::new(Dependency::Connected, Dependency::Disabled);
        assert_eq!(health.status, "healthy");
    }

    #[test]
    fn test_lost_dependency_degrades() {
        let health = HealthResponse::new(Dependency::Connected, Dependency::Disconnected);
        assert_eq!(health.status, "degraded");

        let health = HealthResponse::new(Dependency::Disconnected, Dependency::Disabled);
        assert_eq!(health.status, "degraded");
        assert_eq!(
            serde_json::to_value(&health).unwrap()["database"],
            "disconnected"
        );
    }
}
