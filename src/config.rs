//! Immutable configuration handed to components at construction.

use thiserror::Error;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

pub const DEFAULT_ACCESS_TTL_MINUTES: u64 = 15;
pub const DEFAULT_REFRESH_TTL_HOURS: u64 = 24 * 7;
pub const DEFAULT_REFRESH_COOKIE_PATH: &str = "/api/auth";

pub const MAX_ACCESS_TTL_MINUTES: u64 = 24 * 60;
pub const MAX_REFRESH_TTL_HOURS: u64 = 366 * 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} secret is shorter than {MIN_SECRET_LENGTH} bytes")]
    SecretTooShort(&'static str),
    #[error("access and refresh secrets must differ")]
    SecretsNotDistinct,
    #[error("{0} TTL must be greater than zero")]
    ZeroTtl(&'static str),
    #[error("{0} TTL exceeds the maximum of {1} {2}")]
    TtlTooLong(&'static str, u64, &'static str),
    #[error("refresh cookie path must start with '/': {0}")]
    InvalidCookiePath(String),
}

/// Signing keys and lifetimes for access and refresh tokens.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl_minutes: u64,
    pub refresh_ttl_hours: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_hours", &self.refresh_ttl_hours)
            .finish()
    }
}

impl TokenConfig {
    /// Default lifetimes with the given secrets.
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_ttl_hours: DEFAULT_REFRESH_TTL_HOURS,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_minutes.saturating_mul(60)
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_hours.saturating_mul(60 * 60)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::SecretTooShort("access"));
        }
        if self.refresh_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::SecretTooShort("refresh"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SecretsNotDistinct);
        }
        if self.access_ttl_minutes == 0 {
            return Err(ConfigError::ZeroTtl("access"));
        }
        if self.refresh_ttl_hours == 0 {
            return Err(ConfigError::ZeroTtl("refresh"));
        }
        if self.access_ttl_minutes > MAX_ACCESS_TTL_MINUTES {
            return Err(ConfigError::TtlTooLong(
                "access",
                MAX_ACCESS_TTL_MINUTES,
                "minutes",
            ));
        }
        if self.refresh_ttl_hours > MAX_REFRESH_TTL_HOURS {
            return Err(ConfigError::TtlTooLong(
                "refresh",
                MAX_REFRESH_TTL_HOURS,
                "hours",
            ));
        }
        Ok(())
    }
}

/// How the refresh token is held by the client.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Path the refresh cookie is scoped to. The default `/api/auth` also
    /// sends it to login, register and the other auth routes.
    pub refresh_path: String,
    pub domain: Option<String>,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_COOKIE_PATH.to_string(),
            domain: None,
            secure: false,
        }
    }
}

/// OAuth2 client registration with Google.
#[derive(Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tokens: TokenConfig,
    pub cookies: CookieConfig,
    pub google: GoogleConfig,
    /// Web client origin that receives the federated-login redirect.
    pub frontend_origin: String,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tokens.validate()?;
        if !self.cookies.refresh_path.starts_with('/') {
            return Err(ConfigError::InvalidCookiePath(
                self.cookies.refresh_path.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &[u8] = b"access-secret-access-secret-0123456789";
    const R: &[u8] = b"refresh-secret-refresh-secret-0123456789";

    #[test]
    fn test_defaults() {
        let config = TokenConfig::new(A, R);
        assert_eq!(config.access_ttl_secs(), 15 * 60);
        assert_eq!(config.refresh_ttl_secs(), 168 * 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secrets_must_differ() {
        let config = TokenConfig::new(A, A);
        assert_eq!(config.validate(), Err(ConfigError::SecretsNotDistinct));
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = TokenConfig::new(b"short".to_vec(), R);
        assert_eq!(config.validate(), Err(ConfigError::SecretTooShort("access")));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = TokenConfig::new(A, R);
        config.refresh_ttl_hours = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTtl("refresh")));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let mut config = TokenConfig::new(A, R);
        config.refresh_ttl_hours = u64::MAX / 3600;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TtlTooLong("refresh", MAX_REFRESH_TTL_HOURS, "hours"))
        );

        let mut config = TokenConfig::new(A, R);
        config.access_ttl_minutes = MAX_ACCESS_TTL_MINUTES + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TtlTooLong("access", ..))
        ));

        config.access_ttl_minutes = MAX_ACCESS_TTL_MINUTES;
        config.refresh_ttl_hours = MAX_REFRESH_TTL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", TokenConfig::new(A, R));
        assert!(!debug.contains("access-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_cookie_path_must_be_absolute() {
        let config = AuthConfig {
            tokens: TokenConfig::new(A, R),
            cookies: CookieConfig {
                refresh_path: "api/auth".into(),
                ..CookieConfig::default()
            },
            google: GoogleConfig::default(),
            frontend_origin: String::new(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCookiePath(_))
        ));
    }
}
