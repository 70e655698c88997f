/// Revoked refresh tokens
///
/// Sign-out records the refresh token's `jti` until the token would have
/// expired anyway. Refresh requests check the list first.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::redis::RedisClient;

#[async_trait]
pub trait TokenRevocations: Send + Sync {
    /// Marks `jti` revoked for `ttl`
    async fn revoke(&self, jti: Uuid, ttl: Duration) -> Result<(), redis::RedisError>;

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, redis::RedisError>;
}

fn blacklist_key(jti: Uuid) -> String {
    format!("token_blacklist:{}", jti)
}

#[derive(Clone)]
pub struct RedisTokenRevocations {
    client: RedisClient,
}

impl RedisTokenRevocations {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenRevocations for RedisTokenRevocations {
    async fn revoke(&self, jti: Uuid, ttl: Duration) -> Result<(), redis::RedisError> {
        let mut conn = self.client.connection();
        redis::cmd("SET")
            .arg(blacklist_key(jti))
            .arg(1)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.connection();
        redis::cmd("EXISTS")
            .arg(blacklist_key(jti))
            .query_async(&mut conn)
            .await
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenRevocations {
    revoked: Mutex<HashMap<Uuid, Instant>>,
}

impl MemoryTokenRevocations {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRevocations for MemoryTokenRevocations {
    async fn revoke(&self, jti: Uuid, ttl: Duration) -> Result<(), redis::RedisError> {
        self.revoked.lock().await.insert(jti, Instant::now() + ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, redis::RedisError> {
        let mut revoked = self.revoked.lock().await;
        match revoked.get(&jti) {
            Some(until) if Instant::now() < *until => Ok(true),
            Some(_) => {
                revoked.remove(&jti);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
