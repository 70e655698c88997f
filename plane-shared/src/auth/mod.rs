/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing
/// - [`jwt`]: access, refresh, verification and reset tokens
/// - [`api_token`]: opaque `plane_api_` tokens
/// - [`middleware`]: bearer authentication into an [`middleware::AuthContext`]
/// - [`permission`]: role-based permission evaluator
/// - [`magic_link`]: one-time sign-in codes with attempt cap and TTL
/// - [`revocation`]: revoked refresh tokens
///
/// # Example
///
/// ```no_run
/// use plane_shared::auth::jwt::{create_token, Claims, TokenType};
/// use plane_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let token = create_token(&Claims::new(Uuid::new_v4(), TokenType::Access), "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod api_token;
pub mod jwt;
pub mod magic_link;
pub mod middleware;
pub mod password;
pub mod permission;
pub mod revocation;
