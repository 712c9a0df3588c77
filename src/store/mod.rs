//! Identity and refresh-token store contracts.
//!
//! The session controller only talks to these traits. `crate::db` provides the
//! SQLite implementation, [`memory`] an in-process one used by tests.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Role assigned to every newly registered or federated user.
pub const DEFAULT_ROLE: &str = "user";

/// Roles seeded into every store.
pub const SEEDED_ROLES: [&str; 2] = [DEFAULT_ROLE, "admin"];

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violated (duplicate email, duplicate JTI).
    #[error("unique constraint violated")]
    Conflict,
    /// A referenced row (user, role) does not exist.
    #[error("referenced row not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Identity record. A user holds a password hash or a federated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub provider: Option<String>,
    #[serde(skip)]
    pub provider_subject: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// A user together with a snapshot of their role names.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user: User,
    pub roles: Vec<String>,
}

/// Persisted session record for one refresh-token issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub jti: Uuid,
    pub revoked: bool,
    pub expires_at: i64,
    pub created_at: i64,
}

impl RefreshToken {
    /// Build the row for a freshly issued refresh token.
    pub fn issued(user_id: Uuid, jti: Uuid, expires_at: i64, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            jti,
            revoked: false,
            expires_at,
            created_at: now,
        }
    }

    /// Live means not revoked and strictly before its expiry.
    pub fn is_live(&self, now: i64) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Lowercase and trim an email the same way everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a password-based user. Duplicate email is `StoreError::Conflict`.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    /// Create a federated-only user (no password hash).
    async fn create_federated(
        &self,
        email: &str,
        provider: &str,
        provider_subject: &str,
    ) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Role names held by a user, ordered by role id.
    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>, StoreError>;

    /// Idempotent. Unknown role name is `StoreError::NotFound`.
    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), StoreError>;

    /// The whole role catalogue, ordered by id.
    async fn all_roles(&self) -> Result<Vec<Role>, StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Duplicate JTI is `StoreError::Conflict`.
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, StoreError>;

    /// Idempotent. Returns whether this call flipped the row to revoked.
    async fn revoke_by_jti(&self, jti: Uuid) -> Result<bool, StoreError>;

    /// Idempotent. Returns how many live rows were revoked.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Atomically revoke `old_jti` if it is still live at `now` and insert
    /// `replacement`.
    ///
    /// Returns `Ok(false)` without inserting when `old_jti` is unknown,
    /// already revoked or expired. Of two concurrent calls for the same
    /// `old_jti` at most one returns `Ok(true)`. If the insert fails the
    /// revocation is not kept, so the presented token stays usable for a retry.
    async fn rotate(
        &self,
        old_jti: Uuid,
        now: i64,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError>;
}
