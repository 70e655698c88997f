/// Worker configuration
///
/// Loaded with the `config` crate from `WORKER_*` environment variables
/// over built-in defaults, after `.env` is read.
///
/// | Variable | Default |
/// |---|---|
/// | `WORKER_QUEUE_KEY` | `plane:email_jobs` |
/// | `WORKER_POLL_TIMEOUT_SECS` | `5` |
/// | `WORKER_MAX_IN_FLIGHT` | `8` |
/// | `WORKER_TRANSPORT` | `log` (`log` or `http`) |
/// | `WORKER_RELAY_URL` | unset, required for `http` |
/// | `WORKER_RELAY_TIMEOUT_SECS` | `10` |
/// | `WORKER_FROM_ADDRESS` | `Team Plane <team@mailer.plane.so>` |
/// | `WORKER_SHUTDOWN_GRACE_SECS` | `30` |

use plane_shared::jobs::DEFAULT_QUEUE_KEY;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("WORKER_RELAY_URL is required when WORKER_TRANSPORT=http")]
    MissingRelayUrl,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// How rendered messages leave the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Log,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub queue_key: String,

    /// Longest single blocking pop
    pub poll_timeout_secs: u64,

    /// Messages being sent at once
    pub max_in_flight: usize,

    pub transport: Transport,

    #[serde(default)]
    pub relay_url: Option<String>,

    pub relay_timeout_secs: u64,

    pub from_address: String,

    /// Wait for in-flight sends on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            poll_timeout_secs: 5,
            max_in_flight: 8,
            transport: Transport::Log,
            relay_url: None,
            relay_timeout_secs: 10,
            from_address: "Team Plane <team@mailer.plane.so>".to_string(),
            shutdown_grace_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Reads `WORKER_*` variables over the defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(config::Environment::with_prefix("WORKER"))
    }

    pub fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("queue_key", defaults.queue_key)?
            .set_default("poll_timeout_secs", defaults.poll_timeout_secs)?
            .set_default("max_in_flight", defaults.max_in_flight as u64)?
            .set_default("transport", "log")?
            .set_default("relay_timeout_secs", defaults.relay_timeout_secs)?
            .set_default("from_address", defaults.from_address)?
            .set_default("shutdown_grace_secs", defaults.shutdown_grace_secs)?
            .add_source(source)
            .build()?;

        let config: WorkerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout_secs == 0 {
            return Err(ConfigError::Zero("WORKER_POLL_TIMEOUT_SECS"));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Zero("WORKER_MAX_IN_FLIGHT"));
        }
        if self.transport == Transport::Http
            && self.relay_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(ConfigError::MissingRelayUrl);
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
