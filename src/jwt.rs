//! Signed access and refresh tokens (HS256 JWTs).
//!
//! Access tokens carry the user id and a role snapshot and are verified by
//! signature and expiry alone. Refresh tokens carry a JTI that joins them to a
//! persisted, revocable row. The two kinds are signed with different secrets
//! and carry a `typ` claim, so neither can stand in for the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::unix_now;
use crate::config::TokenConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims of a short-lived access token. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: Uuid,
    /// Role names at issuance
    pub roles: Vec<String>,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a long-lived refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID, the key of the persisted session row
    pub jti: Uuid,
    /// Subject (user id)
    pub sub: Uuid,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claim shapes that can be opened by [`open_envelope`].
trait Envelope: DeserializeOwned + Clone {
    const KIND: TokenType;
    fn kind(&self) -> TokenType;
    fn expires_at(&self) -> u64;
}

impl Envelope for AccessClaims {
    const KIND: TokenType = TokenType::Access;
    fn kind(&self) -> TokenType {
        self.token_type
    }
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

impl Envelope for RefreshClaims {
    const KIND: TokenType = TokenType::Refresh;
    fn kind(&self) -> TokenType {
        self.token_type
    }
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// Verify signature, token kind and expiry, in that order.
///
/// Expiry is checked here instead of by `jsonwebtoken` so that a token is
/// already dead at its `exp` second. All failures look the same to callers.
fn open_envelope<C: Envelope>(token: &str, key: &DecodingKey, now: u64) -> Result<C, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = false;

    let claims = jsonwebtoken::decode::<C>(token, key, &validation)
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

    if claims.kind() != C::KIND || now >= claims.expires_at() {
        return Err(AuthError::InvalidToken);
    }
    Ok(claims)
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: Uuid,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// The outcome of verifying a refresh token's signature and expiry.
/// Says nothing about whether the session row is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedRefresh {
    pub user_id: Uuid,
    pub jti: Uuid,
    pub expires_at: u64,
}

/// Mints and verifies both token kinds. Owns the keys and expiry policy.
#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            access_ttl_secs: config.access_ttl_secs(),
            refresh_ttl_secs: config.refresh_ttl_secs(),
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        roles: &[String],
    ) -> Result<AccessToken, AuthError> {
        self.issue_access_token_at(user_id, roles, now_secs())
    }

    fn issue_access_token_at(
        &self,
        user_id: Uuid,
        roles: &[String],
        now: u64,
    ) -> Result<AccessToken, AuthError> {
        let exp = expiry(now, self.access_ttl_secs)?;
        let claims = AccessClaims {
            sub: user_id,
            roles: roles.to_vec(),
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(AccessToken {
            token,
            expires_at: exp,
        })
    }

    /// Mint a refresh token under a fresh random (v4) JTI.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<IssuedRefreshToken, AuthError> {
        self.issue_refresh_token_at(user_id, now_secs())
    }

    fn issue_refresh_token_at(
        &self,
        user_id: Uuid,
        now: u64,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let jti = Uuid::new_v4();
        let exp = expiry(now, self.refresh_ttl_secs)?;
        let claims = RefreshClaims {
            jti,
            sub: user_id,
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(IssuedRefreshToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        open_envelope(token, &self.access.decoding, now_secs())
    }

    /// Signature and expiry only. The caller must still check the session row.
    pub fn verify_refresh_token(&self, token: &str) -> Result<VerifiedRefresh, AuthError> {
        self.verify_refresh_token_at(token, now_secs())
    }

    fn verify_refresh_token_at(&self, token: &str, now: u64) -> Result<VerifiedRefresh, AuthError> {
        let claims: RefreshClaims = open_envelope(token, &self.refresh.decoding, now)?;
        Ok(VerifiedRefresh {
            user_id: claims.sub,
            jti: claims.jti,
            expires_at: claims.exp,
        })
    }
}

fn now_secs() -> u64 {
    unix_now().max(0) as u64
}

/// `now + ttl`, kept within what the stores can hold as `i64`.
fn expiry(now: u64, ttl_secs: u64) -> Result<u64, AuthError> {
    now.checked_add(ttl_secs)
        .filter(|exp| i64::try_from(*exp).is_ok())
        .ok_or_else(|| AuthError::Signing("token expiry out of range".to_string()))
}
