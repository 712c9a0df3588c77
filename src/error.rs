//! Error taxonomy for the token lifecycle and federated login flows.
//!
//! Callers map these to a protocol response. Every credential-related failure
//! collapses to one caller-facing "unauthorized" answer; the variants only
//! exist so logs and tests can tell them apart.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad email/password, or a missing, revoked, rotated or expired refresh token.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration for an email that already exists.
    #[error("account already exists")]
    Conflict,

    /// The user disappeared between two steps of an operation.
    #[error("user not found")]
    NotFound,

    /// Structural, signature or expiry failure while verifying a signed token.
    #[error("invalid token")]
    InvalidToken,

    /// OAuth `state` missing or not equal to the value held by the client.
    #[error("invalid oauth state")]
    InvalidState,

    #[error("oauth code exchange failed")]
    ExchangeFailed,

    #[error("identity provider unavailable")]
    ProviderUnavailable,

    #[error("identity provider returned an unusable profile")]
    InvalidProfile,

    /// Federated login requested without provider credentials configured.
    #[error("{0} auth not configured")]
    NotConfigured(&'static str),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// Store adapter failure. Retryable by caller policy.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AuthError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Persistence(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AuthError::Conflict,
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Backend(msg) => AuthError::Persistence(msg),
        }
    }
}

/// Failure while wiring up the application.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
