/// API token generation and validation utilities
///
/// Works together with [`crate::models::api_token`], which stores only the
/// SHA-256 hash of each token.
///
/// # Token Format
///
/// `plane_api_{32 base62 chars}` (42 chars total). The fixed prefix lets the
/// authentication layer tell API tokens apart from JWTs without a lookup.
///
/// # Example
///
/// ```
/// use plane_shared::auth::api_token::{generate_api_token, hash_api_token, is_api_token};
///
/// let (token, hash) = generate_api_token();
/// assert!(is_api_token(&token));
/// assert_eq!(hash_api_token(&token), hash);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix carried by every API token
pub const TOKEN_PREFIX: &str = "plane_api_";

const TOKEN_RANDOM_LENGTH: usize = 32;

/// Total length of an API token
pub const API_TOKEN_LENGTH: usize = TOKEN_PREFIX.len() + TOKEN_RANDOM_LENGTH;

/// Characters of the token kept in clear for display
pub const DISPLAY_PREFIX_LENGTH: usize = 14;

/// Generates a new token and its SHA-256 hex hash
pub fn generate_api_token() -> (String, String) {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    let random: String = (0..TOKEN_RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    let token = format!("{}{}", TOKEN_PREFIX, random);
    let hash = hash_api_token(&token);
    (token, hash)
}

/// Hex-encoded SHA-256 of the token
pub fn hash_api_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Display prefix stored alongside the hash
pub fn display_prefix(token: &str) -> String {
    token.chars().take(DISPLAY_PREFIX_LENGTH).collect()
}

/// True when the string has the shape of an API token
pub fn is_api_token(candidate: &str) -> bool {
    candidate.len() == API_TOKEN_LENGTH
        && candidate.starts_with(TOKEN_PREFIX)
        && candidate[TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_token() {
        let (token, hash) = generate_api_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), API_TOKEN_LENGTH);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_tokens_are_unique() {
        let (a, _) = generate_api_token();
        let (b, _) = generate_api_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_api_token("plane_api_x"), hash_api_token("plane_api_x"));
        assert_ne!(hash_api_token("plane_api_x"), hash_api_token("plane_api_y"));
    }

    #[test]
    fn test_is_api_token() {
        let (token, _) = generate_api_token();
        assert!(is_api_token(&token));
        assert!(!is_api_token("plane_api_short"));
        assert!(!is_api_token("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig"));
        assert!(!is_api_token(&format!("{}!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!", TOKEN_PREFIX)));
    }

    #[test]
    fn test_display_prefix() {
        let (token, _) = generate_api_token();
        let prefix = display_prefix(&token);
        assert_eq!(prefix.len(), DISPLAY_PREFIX_LENGTH);
        assert!(token.starts_with(&prefix));
    }
}
