/// Background email jobs
///
/// The API enqueues an [`EmailJob`] and returns; the worker pops jobs and
/// sends them. Jobs are fire-and-forget: nothing waits for delivery.
///
/// Jobs are JSON-encoded with a `kind` tag:
///
/// ```json
/// {"kind": "magic_link", "email": "jane@example.com", "key": "magic_jane@example.com",
///  "token": "ab12-cd34-ef56", "web_url": "https://app.plane.so"}
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::redis::RedisClient;

/// Default Redis list holding pending jobs
pub const DEFAULT_QUEUE_KEY: &str = "plane:email_jobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailJob {
    MagicLink {
        email: String,
        key: String,
        token: String,
        web_url: String,
    },
    EmailVerification {
        email: String,
        first_name: String,
        token: String,
        web_url: String,
    },
    ForgotPassword {
        email: String,
        first_name: String,
        user_id: Uuid,
        token: String,
        web_url: String,
    },
}

impl EmailJob {
    pub fn recipient(&self) -> &str {
        match self {
            EmailJob::MagicLink { email, .. }
            | EmailJob::EmailVerification { email, .. }
            | EmailJob::ForgotPassword { email, .. } => email,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EmailJob::MagicLink { .. } => "magic_link",
            EmailJob::EmailVerification { .. } => "email_verification",
            EmailJob::ForgotPassword { .. } => "forgot_password",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: EmailJob) -> Result<(), JobError>;

    /// Waits up to `timeout` for the next job
    async fn dequeue(&self, timeout: Duration) -> Result<Option<EmailJob>, JobError>;
}

/// Queue backed by a Redis list (LPUSH / BRPOP)
#[derive(Clone)]
pub struct RedisJobQueue {
    client: RedisClient,
    key: String,
}

impl RedisJobQueue {
    pub fn new(client: RedisClient, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: EmailJob) -> Result<(), JobError> {
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.client.connection();

        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(kind = job.kind(), queue = %self.key, "Email job enqueued");
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<EmailJob>, JobError> {
        let mut conn = self.client.connection();

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

/// In-process queue
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<EmailJob>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything queued so far
    pub async fn drain(&self) -> Vec<EmailJob> {
        self.jobs.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: EmailJob) -> Result<(), JobError> {
        self.jobs.lock().await.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<EmailJob>, JobError> {
        if let Some(job) = self.jobs.lock().await.pop_front() {
            return Ok(Some(job));
        }

        if tokio::time::timeout(timeout, self.notify.notified()).await.is_err() {
            return Ok(None);
        }
        Ok(self.jobs.lock().await.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic(email: &str) -> EmailJob {
        EmailJob::MagicLink {
            email: email.to_string(),
            key: format!("magic_{}", email),
            token: "abcd-efgh-ijkl".to_string(),
            web_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_job_serialization_is_tagged() {
        let json = serde_json::to_value(magic("jane@example.com")).unwrap();
        assert_eq!(json["kind"], "magic_link");
        assert_eq!(json["key"], "magic_jane@example.com");

        let back: EmailJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.recipient(), "jane@example.com");
    }

    #[tokio::test]
    async fn test_memory_queue_fifo() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(magic("a@example.com")).await.unwrap();
        queue.enqueue(magic("b@example.com")).await.unwrap();

        let first = queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.recipient(), "a@example.com");
        assert_eq!(second.recipient(), "b@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_queue_times_out_when_empty() {
        let queue = MemoryJobQueue::new();
        let job = queue.dequeue(Duration::from_secs(5)).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_wakes_waiting_consumer() {
        let queue = std::sync::Arc::new(MemoryJobQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        queue.enqueue(magic("late@example.com")).await.unwrap();

        let job = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(job.recipient(), "late@example.com");
    }
}
