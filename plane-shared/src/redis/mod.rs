/// Redis integration
///
/// Redis holds the short-lived state that stays off the primary database:
///
/// ```text
///   magic_{email}            magic-link session, TTL 600s
///   token_blacklist:{jti}    revoked refresh token, TTL = remaining lifetime
///   plane:email_jobs         list drained by the email worker (LPUSH / BRPOP)
/// ```

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
