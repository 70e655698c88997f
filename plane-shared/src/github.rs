/// GitHub App REST client
///
/// Calls are authenticated as the App itself with a short-lived RS256 JWT
/// (`iss = app_id`, backdated 60s for clock drift, valid 10 minutes).
/// Repository listing exchanges the App JWT for an installation token first.
///
/// # Example
///
/// ```no_run
/// use plane_shared::github::{GithubClient, GithubConfig, HttpGithubClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpGithubClient::new(GithubConfig {
///     app_id: "123456".to_string(),
///     private_key: std::fs::read_to_string("app.pem")?,
///     api_url: "https://api.github.com".to_string(),
/// })?;
/// let metadata = client.installation_metadata(42).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "plane-integration";
const JWT_BACKDATE_SECS: u64 = 60;
const JWT_LIFETIME_SECS: u64 = 600;

/// Repositories requested per page
pub const REPOSITORIES_PER_PAGE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("GitHub App is not configured")]
    NotConfigured,

    #[error("Failed to sign app JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected GitHub response: {0}")]
    Response(String),
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub app_id: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
    pub api_url: String,
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
}

#[async_trait]
pub trait GithubClient: Send + Sync {
    /// Raw installation object (`GET /app/installations/{id}`)
    async fn installation_metadata(
        &self,
        installation_id: i64,
    ) -> Result<serde_json::Value, GithubError>;

    /// Uninstalls the App from the account (`DELETE /app/installations/{id}`)
    async fn delete_installation(&self, installation_id: i64) -> Result<(), GithubError>;

    /// One page of repositories visible to the installation
    async fn list_repositories(
        &self,
        access_tokens_url: &str,
        repositories_url: &str,
        page: u32,
    ) -> Result<serde_json::Value, GithubError>;
}

pub struct HttpGithubClient {
    http: reqwest::Client,
    app_id: String,
    key: EncodingKey,
    api_url: String,
}

impl HttpGithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, GithubError> {
        if config.app_id.is_empty() || config.private_key.is_empty() {
            return Err(GithubError::NotConfigured);
        }

        let key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            app_id: config.app_id,
            key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn app_jwt(&self) -> Result<String, GithubError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let claims = AppClaims {
            iat: now.saturating_sub(JWT_BACKDATE_SECS),
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };

        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.key)?)
    }

    fn request(&self, method: reqwest::Method, url: &str, bearer: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(bearer)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn installation_token(&self, access_tokens_url: &str) -> Result<String, GithubError> {
        let jwt = self.app_jwt()?;
        let response = self
            .request(reqwest::Method::POST, access_tokens_url, &jwt)
            .send()
            .await?;
        let token: InstallationToken = check(response).await?.json().await?;
        Ok(token.token)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, GithubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GithubError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Appends the paging query to a repositories URL
pub fn paged_repositories_url(repositories_url: &str, page: u32) -> String {
    let separator = if repositories_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}per_page={}&page={}",
        repositories_url, separator, REPOSITORIES_PER_PAGE, page
    )
}

#[async_trait]
impl GithubClient for HttpGithubClient {
    async fn installation_metadata(
        &self,
        installation_id: i64,
    ) -> Result<serde_json::Value, GithubError> {
        let url = format!("{}/app/installations/{}", self.api_url, installation_id);
        debug!(installation_id, "Fetching GitHub installation");

        let response = self
            .request(reqwest::Method::GET, &url, &self.app_jwt()?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete_installation(&self, installation_id: i64) -> Result<(), GithubError> {
        let url = format!("{}/app/installations/{}", self.api_url, installation_id);

        let response = self
            .request(reqwest::Method::DELETE, &url, &self.app_jwt()?)
            .send()
            .await?;
        check(response).await?;

        info!(installation_id, "GitHub installation deleted");
        Ok(())
    }

    async fn list_repositories(
        &self,
        access_tokens_url: &str,
        repositories_url: &str,
        page: u32,
    ) -> Result<serde_json::Value, GithubError> {
        let token = self.installation_token(access_tokens_url).await?;
        let url = paged_repositories_url(repositories_url, page);

        let response = self
            .request(reqwest::Method::GET, &url, &token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Client used when no GitHub App is configured; every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGithubClient;

#[async_trait]
impl GithubClient for DisabledGithubClient {
    async fn installation_metadata(&self, _: i64) -> Result<serde_json::Value, GithubError> {
        Err(GithubError::NotConfigured)
    }

    async fn delete_installation(&self, _: i64) -> Result<(), GithubError> {
        Err(GithubError::NotConfigured)
    }

    async fn list_repositories(
        &self,
        _: &str,
        _: &str,
        _: u32,
    ) -> Result<serde_json::Value, GithubError> {
        Err(GithubError::NotConfigured)
    }
}

/// Canned responses for tests and offline development
///
/// Unknown installations return a metadata object carrying
/// `access_tokens_url` / `repositories_url` derived from the id.
#[derive(Debug, Default)]
pub struct StaticGithubClient {
    installations: Mutex<HashMap<i64, serde_json::Value>>,
    looked_up: Mutex<Vec<i64>>,
    deleted: Mutex<Vec<i64>>,
    fail_deletes: bool,
}

impl StaticGithubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose `delete_installation` always fails
    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn with_installation(self, installation_id: i64, metadata: serde_json::Value) -> Self {
        if let Ok(mut map) = self.installations.lock() {
            map.insert(installation_id, metadata);
        }
        self
    }

    /// Installation ids whose metadata was requested, in call order
    pub fn looked_up(&self) -> Vec<i64> {
        self.looked_up.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GithubClient for StaticGithubClient {
    async fn installation_metadata(
        &self,
        installation_id: i64,
    ) -> Result<serde_json::Value, GithubError> {
        if let Ok(mut looked_up) = self.looked_up.lock() {
            looked_up.push(installation_id);
        }
        let known = self
            .installations
            .lock()
            .ok()
            .and_then(|map| map.get(&installation_id).cloned());

        Ok(known.unwrap_or_else(|| {
            serde_json::json!({
                "id": installation_id,
                "access_tokens_url": format!(
                    "{}/app/installations/{}/access_tokens",
                    DEFAULT_API_URL, installation_id
                ),
                "repositories_url": format!("{}/installation/repositories", DEFAULT_API_URL),
            })
        }))
    }

    async fn delete_installation(&self, installation_id: i64) -> Result<(), GithubError> {
        if self.fail_deletes {
            return Err(GithubError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(installation_id);
        }
        Ok(())
    }

    async fn list_repositories(
        &self,
        _access_tokens_url: &str,
        repositories_url: &str,
        page: u32,
    ) -> Result<serde_json::Value, GithubError> {
        Ok(serde_json::json!({
            "total_count": 0,
            "repositories": [],
            "url": paged_repositories_url(repositories_url, page),
        }))
    }
}
