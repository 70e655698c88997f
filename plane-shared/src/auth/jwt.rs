/// JWT token generation and validation
///
/// Tokens are signed with HS256 and carry the user id as `sub`. Every token has
/// a `jti` so that refresh tokens can be revoked on sign-out.
///
/// # Token Types
///
/// - **Access**: API authentication (default 7 days)
/// - **Refresh**: obtains new access tokens (default 30 days)
/// - **EmailVerification**: sent by mail to confirm an address (24 hours)
/// - **PasswordReset**: sent by mail to reset a password (1 hour). Carries a
///   fingerprint of the password hash it was issued against.
///
/// # Example
///
/// ```
/// use plane_shared::auth::jwt::{create_token, validate_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
///
/// let claims = Claims::new(user_id, TokenType::Access);
/// let token = create_token(&claims, "your-secret-key")?;
///
/// let validated = validate_token(&token, "your-secret-key")?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `iss` claim
pub const ISSUER: &str = "plane";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token type: expected {expected}, got {actual}")]
    WrongType { expected: &'static str, actual: &'static str },

    #[error("Invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::days(7),
            TokenType::Refresh => Duration::days(30),
            TokenType::EmailVerification => Duration::hours(24),
            TokenType::PasswordReset => Duration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::EmailVerification => "email_verification",
            TokenType::PasswordReset => "password_reset",
        }
    }
}

/// JWT claims
///
/// - `sub`: user id
/// - `iss`: always `"plane"`
/// - `iat`, `exp`, `nbf`: Unix timestamps
/// - `jti`: unique token id, used for revocation
/// - `token_type`: one of [`TokenType`]
/// - `fingerprint`: password hash digest, reset tokens only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub jti: Uuid,
    pub token_type: TokenType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Claims {
    pub fn new(user_id: Uuid, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, token_type, token_type.default_expiration())
    }

    pub fn with_expiration(user_id: Uuid, token_type: TokenType, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4(),
            token_type,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        if self.exp > now {
            Some(Duration::seconds(self.exp - now))
        } else {
            None
        }
    }
}

/// Lifetimes used when issuing a sign-in token pair
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: TokenType::Access.default_expiration(),
            refresh: TokenType::Refresh.default_expiration(),
        }
    }
}

/// Access and refresh token returned by every sign-in path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Issues a fresh access/refresh pair for the user
pub fn issue_token_pair(
    user_id: Uuid,
    secret: &str,
    lifetimes: TokenLifetimes,
) -> Result<TokenPair, JwtError> {
    let access = Claims::with_expiration(user_id, TokenType::Access, lifetimes.access);
    let refresh = Claims::with_expiration(user_id, TokenType::Refresh, lifetimes.refresh);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
    })
}

/// Validates signature, expiry, `nbf` and issuer
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
            expected: ISSUER.to_string(),
            actual: "unknown".to_string(),
        },
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Validates a token and checks its type
pub fn validate_typed_token(
    token: &str,
    secret: &str,
    expected: TokenType,
) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        });
    }

    Ok(claims)
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed_token(token, secret, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed_token(token, secret, TokenType::Refresh)
}

/// Exchanges a refresh token for a new access token
///
/// Revocation is checked by the caller.
pub fn refresh_access_token(
    refresh_token: &str,
    secret: &str,
    access_ttl: Duration,
) -> Result<String, JwtError> {
    let refresh_claims = validate_refresh_token(refresh_token, secret)?;
    let access_claims = Claims::with_expiration(refresh_claims.sub, TokenType::Access, access_ttl);

    create_token(&access_claims, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::days(7));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
        assert_eq!(TokenType::EmailVerification.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::PasswordReset.default_expiration(), Duration::hours(1));
    }

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, TokenType::Access);

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "plane");
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(claims.fingerprint.is_none());
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let user_id = Uuid::new_v4();
        let a = Claims::new(user_id, TokenType::Refresh);
        let b = Claims::new(user_id, TokenType::Refresh);
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_claims_with_custom_expiration() {
        let claims = Claims::with_expiration(Uuid::new_v4(), TokenType::Access, Duration::hours(1));

        let time_left = claims.time_until_expiration().unwrap();
        assert!(time_left.num_seconds() > 3500);
        assert!(time_left.num_seconds() <= 3600);
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, TokenType::Access);
        let token = create_token(&claims, SECRET).expect("Should create token");

        let validated = validate_token(&token, SECRET).expect("Should validate token");
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.jti, claims.jti);
        assert_eq!(validated.iss, "plane");
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), TokenType::Access);
        let token = create_token(&claims, "secret1").unwrap();

        assert!(validate_token(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_validate_expired_token() {
        let claims =
            Claims::with_expiration(Uuid::new_v4(), TokenType::Access, Duration::seconds(-3600));

        assert!(claims.is_expired());
        assert!(claims.time_until_expiration().is_none());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_typed_validation() {
        let access = create_token(&Claims::new(Uuid::new_v4(), TokenType::Access), SECRET).unwrap();
        let refresh = create_token(&Claims::new(Uuid::new_v4(), TokenType::Refresh), SECRET).unwrap();

        assert!(validate_access_token(&access, SECRET).is_ok());
        assert!(validate_access_token(&refresh, SECRET).is_err());
        assert!(validate_refresh_token(&refresh, SECRET).is_ok());
        assert!(matches!(
            validate_refresh_token(&access, SECRET),
            Err(JwtError::WrongType { expected: "refresh", actual: "access" })
        ));
    }

    #[test]
    fn test_fingerprint_roundtrip() {
        let claims =
            Claims::new(Uuid::new_v4(), TokenType::PasswordReset).with_fingerprint("abcd1234");
        let token = create_token(&claims, SECRET).unwrap();

        let validated = validate_typed_token(&token, SECRET, TokenType::PasswordReset).unwrap();
        assert_eq!(validated.fingerprint.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn test_issue_token_pair() {
        let user_id = Uuid::new_v4();
        let pair = issue_token_pair(user_id, SECRET, TokenLifetimes::default()).unwrap();

        let access = validate_access_token(&pair.access_token, SECRET).unwrap();
        let refresh = validate_refresh_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(refresh.sub, user_id);
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn test_refresh_access_token() {
        let user_id = Uuid::new_v4();
        let refresh = create_token(&Claims::new(user_id, TokenType::Refresh), SECRET).unwrap();

        let access = refresh_access_token(&refresh, SECRET, Duration::minutes(10)).unwrap();
        let validated = validate_access_token(&access, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert!(validated.exp - validated.iat <= 600);
    }

    #[test]
    fn test_refresh_with_access_token_fails() {
        let access = create_token(&Claims::new(Uuid::new_v4(), TokenType::Access), SECRET).unwrap();
        assert!(refresh_access_token(&access, SECRET, Duration::minutes(10)).is_err());
    }
}
