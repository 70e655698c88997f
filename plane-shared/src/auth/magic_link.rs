/// Magic-link sign-in codes
///
/// A request for an email stores a session under `magic_{email}` for 600
/// seconds and mails a code like `k3x9-p02m-a7qz`. Verifying the code deletes
/// the session, so a code works once.
///
/// # States
///
/// ```text
/// NoSession ──request──> Issued ──request──> Reissued (×2) ──request──> Exhausted
///                          │                    │
///                          └──── verify ok ─────┴──> Consumed (key deleted)
///                          └──── TTL elapses ───────> Expired  (key absent)
/// ```
///
/// Requests 1 to 3 inside the window succeed; request 4 is rejected without
/// touching the stored code or its TTL. A wrong code on verify leaves the
/// session alone and does not count as an attempt.
///
/// # Example
///
/// ```no_run
/// use plane_shared::auth::magic_link::{MagicLinkService, MemoryMagicLinkStore};
/// use plane_shared::jobs::MemoryJobQueue;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let jobs = Arc::new(MemoryJobQueue::new());
/// let service = MagicLinkService::new(
///     Arc::new(MemoryMagicLinkStore::new()),
///     jobs.clone(),
///     "http://localhost:3000",
/// );
///
/// let key = service.request("jane@example.com").await?;
/// assert_eq!(key, "magic_jane@example.com");
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::jobs::{EmailJob, JobError, JobQueue};
use crate::models::user::normalize_email;
use crate::redis::RedisClient;

/// Lifetime of a magic-link session
pub const MAGIC_LINK_TTL: Duration = Duration::from_secs(600);

/// Highest stored attempt number; the request that would exceed it is refused
pub const MAX_ATTEMPT: u32 = 2;

const KEY_PREFIX: &str = "magic_";
const CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, thiserror::Error)]
pub enum MagicLinkError {
    #[error("Max attempts exhausted. Please try again later.")]
    Exhausted,

    #[error("The magic code/link has expired please try again")]
    Expired,

    #[error("Your login code was incorrect. Please try again.")]
    IncorrectCode,

    #[error("User token and key are required")]
    MissingFields,

    #[error("Session store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Malformed session: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Failed to enqueue email: {0}")]
    Queue(#[from] JobError),
}

/// Stored session value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicSession {
    pub current_attempt: u32,
    pub email: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued { attempt: u32 },
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { email: String },
    Incorrect,
    Missing,
}

/// Session key for an email address
pub fn session_key(email: &str) -> String {
    format!("{}{}", KEY_PREFIX, normalize_email(email))
}

/// Three groups of four lowercase alphanumerics joined by `-`
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..4)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    };
    format!("{}-{}-{}", group(), group(), group())
}

/// Atomic storage for magic-link sessions
#[async_trait]
pub trait MagicLinkStore: Send + Sync {
    /// Creates or reissues a session
    ///
    /// Must be a single atomic get-then-set. On `Exhausted` the stored value
    /// and its TTL are left untouched.
    async fn issue(
        &self,
        key: &str,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempt: u32,
    ) -> Result<IssueOutcome, MagicLinkError>;

    /// Deletes the session if `code` matches, atomically
    async fn consume(&self, key: &str, code: &str) -> Result<ConsumeOutcome, MagicLinkError>;
}

const ISSUE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local attempt = 0
if current then
    local state = cjson.decode(current)
    attempt = tonumber(state['current_attempt']) + 1
    if attempt > tonumber(ARGV[4]) then
        return -1
    end
end
local value = cjson.encode({current_attempt = attempt, email = ARGV[1], token = ARGV[2]})
redis.call('SET', KEYS[1], value, 'EX', tonumber(ARGV[3]))
return attempt
"#;

const CONSUME_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return {0, ''}
end
local state = cjson.decode(current)
if state['token'] ~= ARGV[1] then
    return {1, ''}
end
redis.call('DEL', KEYS[1])
return {2, state['email']}
"#;

/// Redis-backed store using Lua scripts for atomicity
#[derive(Clone)]
pub struct RedisMagicLinkStore {
    client: RedisClient,
    issue: Arc<redis::Script>,
    consume: Arc<redis::Script>,
}

impl RedisMagicLinkStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            issue: Arc::new(redis::Script::new(ISSUE_SCRIPT)),
            consume: Arc::new(redis::Script::new(CONSUME_SCRIPT)),
        }
    }
}

#[async_trait]
impl MagicLinkStore for RedisMagicLinkStore {
    async fn issue(
        &self,
        key: &str,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempt: u32,
    ) -> Result<IssueOutcome, MagicLinkError> {
        let mut conn = self.client.connection();
        let attempt: i64 = self
            .issue
            .key(key)
            .arg(email)
            .arg(code)
            .arg(ttl.as_secs())
            .arg(max_attempt)
            .invoke_async(&mut conn)
            .await?;

        if attempt < 0 {
            Ok(IssueOutcome::Exhausted)
        } else {
            Ok(IssueOutcome::Issued {
                attempt: attempt as u32,
            })
        }
    }

    async fn consume(&self, key: &str, code: &str) -> Result<ConsumeOutcome, MagicLinkError> {
        let mut conn = self.client.connection();
        let (status, email): (i64, String) = self
            .consume
            .key(key)
            .arg(code)
            .invoke_async(&mut conn)
            .await?;

        Ok(match status {
            2 => ConsumeOutcome::Consumed { email },
            1 => ConsumeOutcome::Incorrect,
            _ => ConsumeOutcome::Missing,
        })
    }
}

/// In-process store; expiry follows `tokio::time`
#[derive(Debug, Default)]
pub struct MemoryMagicLinkStore {
    sessions: Mutex<HashMap<String, (MagicSession, Instant)>>,
}

impl MemoryMagicLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live session, if any
    pub async fn peek(&self, key: &str) -> Option<MagicSession> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(session, _)| session.clone())
    }
}

#[async_trait]
impl MagicLinkStore for MemoryMagicLinkStore {
    async fn issue(
        &self,
        key: &str,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempt: u32,
    ) -> Result<IssueOutcome, MagicLinkError> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        let attempt = match sessions.get(key) {
            Some((session, expires_at)) if now < *expires_at => session.current_attempt + 1,
            _ => 0,
        };
        if attempt > max_attempt {
            return Ok(IssueOutcome::Exhausted);
        }

        let session = MagicSession {
            current_attempt: attempt,
            email: email.to_string(),
            token: code.to_string(),
        };
        sessions.insert(key.to_string(), (session, now + ttl));

        Ok(IssueOutcome::Issued { attempt })
    }

    async fn consume(&self, key: &str, code: &str) -> Result<ConsumeOutcome, MagicLinkError> {
        let mut sessions = self.sessions.lock().await;

        let outcome = match sessions.get(key) {
            Some((_, expires_at)) if Instant::now() >= *expires_at => ConsumeOutcome::Missing,
            Some((session, _)) if session.token == code => ConsumeOutcome::Consumed {
                email: session.email.clone(),
            },
            Some(_) => ConsumeOutcome::Incorrect,
            None => ConsumeOutcome::Missing,
        };

        match outcome {
            ConsumeOutcome::Consumed { .. } | ConsumeOutcome::Missing => {
                sessions.remove(key);
            }
            ConsumeOutcome::Incorrect => {}
        }

        Ok(outcome)
    }
}

/// Issues and verifies magic-link codes
#[derive(Clone)]
pub struct MagicLinkService {
    store: Arc<dyn MagicLinkStore>,
    jobs: Arc<dyn JobQueue>,
    web_url: String,
}

impl MagicLinkService {
    pub fn new(
        store: Arc<dyn MagicLinkStore>,
        jobs: Arc<dyn JobQueue>,
        web_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            jobs,
            web_url: web_url.into(),
        }
    }

    /// Issues a code for `email`, mails it and returns the session key
    ///
    /// The code itself is never returned.
    pub async fn request(&self, email: &str) -> Result<String, MagicLinkError> {
        let email = normalize_email(email);
        let key = session_key(&email);
        let code = generate_code();

        match self
            .store
            .issue(&key, &email, &code, MAGIC_LINK_TTL, MAX_ATTEMPT)
            .await?
        {
            IssueOutcome::Exhausted => {
                tracing::warn!(key = %key, "Magic link request refused, attempts exhausted");
                return Err(MagicLinkError::Exhausted);
            }
            IssueOutcome::Issued { attempt } => {
                tracing::info!(key = %key, attempt, "Magic link issued");
            }
        }

        self.jobs
            .enqueue(EmailJob::MagicLink {
                email,
                key: key.clone(),
                token: code,
                web_url: self.web_url.clone(),
            })
            .await?;

        Ok(key)
    }

    /// Checks a code and returns the email it was issued for
    pub async fn verify(&self, key: &str, token: &str) -> Result<String, MagicLinkError> {
        let key = key.trim();
        let token = token.trim().to_lowercase();
        if key.is_empty() || token.is_empty() {
            return Err(MagicLinkError::MissingFields);
        }

        match self.store.consume(key, &token).await? {
            ConsumeOutcome::Consumed { email } => {
                tracing::info!(key = %key, "Magic link consumed");
                Ok(email)
            }
            ConsumeOutcome::Incorrect => Err(MagicLinkError::IncorrectCode),
            ConsumeOutcome::Missing => Err(MagicLinkError::Expired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::MemoryJobQueue;

    fn service() -> (MagicLinkService, Arc<MemoryMagicLinkStore>, Arc<MemoryJobQueue>) {
        let store = Arc::new(MemoryMagicLinkStore::new());
        let jobs = Arc::new(MemoryJobQueue::new());
        let service = MagicLinkService::new(store.clone(), jobs.clone(), "http://localhost:3000");
        (service, store, jobs)
    }

    async fn mailed_code(jobs: &MemoryJobQueue) -> String {
        match jobs.drain().await.pop() {
            Some(EmailJob::MagicLink { token, .. }) => token,
            other => panic!("expected magic link job, got {:?}", other),
        }
    }

    #[test]
    fn test_code_format() {
        for _ in 0..50 {
            let code = generate_code();
            let groups: Vec<&str> = code.split('-').collect();
            assert_eq!(groups.len(), 3);
            for group in groups {
                assert_eq!(group.len(), 4);
                assert!(group
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_session_key_normalizes_email() {
        assert_eq!(session_key(" Jane@Example.COM "), "magic_jane@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_request_is_rejected() {
        let (service, store, jobs) = service();
        let email = "jane@example.com";

        for expected_attempt in 0..=2 {
            service.request(email).await.unwrap();
            let session = store.peek(&session_key(email)).await.unwrap();
            assert_eq!(session.current_attempt, expected_attempt);
        }
        let before = store.peek(&session_key(email)).await.unwrap();

        let fourth = service.request(email).await;
        assert!(matches!(fourth, Err(MagicLinkError::Exhausted)));

        let after = store.peek(&session_key(email)).await.unwrap();
        assert_eq!(before, after, "exhausted request must not touch the session");
        assert_eq!(jobs.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_does_not_extend_ttl() {
        let (service, store, _jobs) = service();
        let email = "jane@example.com";

        for _ in 0..3 {
            service.request(email).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(service.request(email).await.is_err());

        tokio::time::advance(Duration::from_secs(201)).await;
        assert!(store.peek(&session_key(email)).await.is_none());

        // window elapsed, a new session starts from scratch
        service.request(email).await.unwrap();
        let session = store.peek(&session_key(email)).await.unwrap();
        assert_eq!(session.current_attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_consumes_once() {
        let (service, _store, jobs) = service();
        let key = service.request("jane@example.com").await.unwrap();
        let code = mailed_code(&jobs).await;

        let email = service.verify(&key, &format!("  {}  ", code.to_uppercase())).await.unwrap();
        assert_eq!(email, "jane@example.com");

        let replay = service.verify(&key, &code).await;
        assert!(matches!(replay, Err(MagicLinkError::Expired)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incorrect_code_keeps_session_and_never_rate_limits() {
        let (service, _store, jobs) = service();
        let key = service.request("jane@example.com").await.unwrap();
        let code = mailed_code(&jobs).await;

        for _ in 0..5 {
            let result = service.verify(&key, "zzzz-zzzz-zzzz").await;
            assert!(matches!(result, Err(MagicLinkError::IncorrectCode)));
        }

        assert!(service.verify(&key, &code).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_code_after_window_is_expired() {
        let (service, _store, jobs) = service();
        let key = service.request("jane@example.com").await.unwrap();
        let code = mailed_code(&jobs).await;

        tokio::time::advance(MAGIC_LINK_TTL + Duration::from_secs(1)).await;

        let result = service.verify(&key, &code).await;
        assert!(matches!(result, Err(MagicLinkError::Expired)));
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let (service, _store, _jobs) = service();
        assert!(matches!(
            service.verify("", "abcd-efgh-ijkl").await,
            Err(MagicLinkError::MissingFields)
        ));
        assert!(matches!(
            service.verify("magic_jane@example.com", "   ").await,
            Err(MagicLinkError::MissingFields)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reissue_replaces_code() {
        let (service, _store, jobs) = service();
        let key = service.request("jane@example.com").await.unwrap();
        let first = mailed_code(&jobs).await;
        service.request("jane@example.com").await.unwrap();
        let second = mailed_code(&jobs).await;

        if first != second {
            assert!(matches!(
                service.verify(&key, &first).await,
                Err(MagicLinkError::IncorrectCode)
            ));
        }
        assert!(service.verify(&key, &second).await.is_ok());
    }
}
