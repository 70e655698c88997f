/// User model and database operations
///
/// Users are created on first password sign-in, on first magic-link sign-in,
/// or as bot actors when an integration is installed. They are mutated on every
/// login and logout and are never hard-deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username VARCHAR(128) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(255) NOT NULL DEFAULT '',
///     last_name VARCHAR(255) NOT NULL DEFAULT '',
///     avatar TEXT NOT NULL DEFAULT '',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     is_bot BOOLEAN NOT NULL DEFAULT FALSE,
///     is_password_autoset BOOLEAN NOT NULL DEFAULT FALSE,
///     is_email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     last_active TIMESTAMPTZ,
///     last_login_time TIMESTAMPTZ,
///     last_login_ip VARCHAR(255) NOT NULL DEFAULT '',
///     last_login_uagent TEXT NOT NULL DEFAULT '',
///     last_logout_time TIMESTAMPTZ,
///     last_logout_ip VARCHAR(255) NOT NULL DEFAULT '',
///     token_updated_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use plane_shared::models::user::{CreateUser, User};
/// use plane_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser::new("jane@example.com", "$argon2id$...")).await?;
/// let found = User::find_by_email(&pool, "JANE@example.com ").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// User account
///
/// The password hash is never serialized into responses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Random hex string assigned at creation
    pub username: String,

    /// Lowercased email address, unique across all users
    pub email: String,

    /// Argon2id hash; for auto-set passwords it hashes a random secret nobody knows
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub avatar: String,

    /// Deactivated users cannot sign in
    pub is_active: bool,

    /// Synthetic actor created for an integration
    pub is_bot: bool,

    /// True until the user picks a password of their own
    pub is_password_autoset: bool,

    pub is_email_verified: bool,

    pub last_active: Option<DateTime<Utc>>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub last_login_ip: String,
    pub last_login_uagent: String,
    pub last_logout_time: Option<DateTime<Utc>>,
    pub last_logout_ip: String,

    /// Last time tokens were issued for this user
    pub token_updated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address; normalized before insert
    pub email: String,

    /// Argon2id hash (never plaintext)
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub is_bot: bool,
    pub is_password_autoset: bool,
}

impl CreateUser {
    /// Human account with the given email and password hash
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            avatar: String::new(),
            is_bot: false,
            is_password_autoset: false,
        }
    }

    /// Marks the password as system-generated
    pub fn password_autoset(mut self) -> Self {
        self.is_password_autoset = true;
        self
    }
}

/// Profile fields a user may edit about themselves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
}

/// Trims and lowercases an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Creates a new user
    ///
    /// The username is a fresh random hex string and the email is normalized.
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if the email is taken.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        data: CreateUser,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name,
                               avatar, is_bot, is_password_autoset)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().simple().to_string())
        .bind(normalize_email(&data.email))
        .bind(data.password_hash)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.avatar)
        .bind(data.is_bot)
        .bind(data.is_password_autoset)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds a user by email address
    ///
    /// The lookup value is normalized first, so `" Jane@Example.com"` matches
    /// the stored `"jane@example.com"`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use plane_shared::models::user::User;
    /// # use sqlx::PgPool;
    /// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
    /// if let Some(user) = User::find_by_email(&pool, "user@example.com").await? {
    ///     println!("Found user: {}", user.id);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn find_by_email(
        executor: impl PgExecutor<'_>,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(executor)
            .await
    }

    /// Updates profile fields; only `Some` values change
    pub async fn update(
        executor: impl PgExecutor<'_>,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                avatar = COALESCE($4, avatar),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.avatar)
        .fetch_optional(executor)
        .await
    }

    /// Records a successful sign-in
    ///
    /// Stamps `last_active`, `last_login_time`, `last_login_ip`,
    /// `last_login_uagent` and `token_updated_at`.
    pub async fn record_login(
        executor: impl PgExecutor<'_>,
        id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET last_active = NOW(),
                last_login_time = NOW(),
                last_login_ip = $2,
                last_login_uagent = $3,
                token_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ip.unwrap_or_default())
        .bind(user_agent.unwrap_or_default())
        .fetch_one(executor)
        .await
    }

    /// Records a sign-out
    pub async fn record_logout(
        executor: impl PgExecutor<'_>,
        id: Uuid,
        ip: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_logout_time = NOW(),
                last_logout_ip = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ip.unwrap_or_default())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the password hash and clears the auto-set flag
    pub async fn set_password(
        executor: impl PgExecutor<'_>,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                is_password_autoset = FALSE,
                token_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks the user's email as verified
    pub async fn mark_email_verified(
        executor: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_email_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Full name for message greetings, falling back to the email address
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: Uuid::new_v4().simple().to_string(),
            email: "jane@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            avatar: String::new(),
            is_active: true,
            is_bot: false,
            is_password_autoset: false,
            is_email_verified: false,
            last_active: None,
            last_login_time: None,
            last_login_ip: String::new(),
            last_login_uagent: String::new(),
            last_logout_time: None,
            last_logout_ip: String::new(),
            token_updated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert_eq!(normalize_email("bob@example.com"), "bob@example.com");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "jane@example.com");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut user = sample_user();
        assert_eq!(user.display_name(), "jane@example.com");

        user.first_name = "Jane".to_string();
        assert_eq!(user.display_name(), "Jane");

        user.last_name = "Doe".to_string();
        assert_eq!(user.display_name(), "Jane Doe");
    }

    #[test]
    fn test_create_user_builder() {
        let data = CreateUser::new("a@b.co", "hash").password_autoset();
        assert!(data.is_password_autoset);
        assert!(!data.is_bot);
    }
}
