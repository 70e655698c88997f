/// Mail transports
///
/// A [`Mailer`] takes a rendered [`EmailMessage`] and delivers it.
/// [`LogMailer`] writes the message to the log; [`HttpMailer`] POSTs it as
/// JSON to a relay.
///
/// # Example
///
/// ```no_run
/// use plane_worker::mailer::{EmailMessage, HttpMailer, Mailer};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = HttpMailer::new("http://relay.internal/send", Duration::from_secs(10))?;
/// mailer
///     .send(&EmailMessage {
///         from: "Team Plane <team@mailer.plane.so>".to_string(),
///         to: "jane@example.com".to_string(),
///         subject: "Hello".to_string(),
///         body: "Hi Jane".to_string(),
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A plain-text message ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            body = %message.body,
            "Email"
        );
        Ok(())
    }
}

/// Posts messages to an HTTP relay
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("plane-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %message.to, status = status.as_u16(), "Relay accepted message");
        Ok(())
    }
}

/// Keeps sent messages in memory
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
