//! OAuth2 authorization-code login against a third-party identity provider.
//!
//! `start` hands out a random state that the client keeps for at most
//! [`STATE_TTL_SECS`]; `callback` refuses to talk to the provider unless the
//! state echoed back by the redirect is byte-equal to the one the client held.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Deserialize;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::config::GoogleConfig;
use crate::error::AuthError;
use crate::session::{Session, SessionController};

/// Lifetime of the client-held state token.
pub const STATE_TTL_SECS: i64 = 5 * 60;

const STATE_BYTES: usize = 32;

pub const GOOGLE: &str = "google";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

/// The identity a provider vouches for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider label stored on federated users.
    fn name(&self) -> &'static str;

    /// Where to send the browser to authenticate, embedding `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Trade an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleProvider {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        GOOGLE
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("state", state)
            .append_pair("access_type", "online")
            .append_pair("prompt", "select_account")
            .finish();
        format!("{}?{}", GOOGLE_AUTH_URL, query)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("code", code)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("grant_type", "authorization_code")
            .finish();

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Token endpoint unreachable");
                AuthError::ExchangeFailed
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Code exchange rejected");
            return Err(AuthError::ExchangeFailed);
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed token response");
            AuthError::ExchangeFailed
        })?;
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Userinfo endpoint unreachable");
                AuthError::ProviderUnavailable
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Userinfo request rejected");
            return Err(AuthError::ProviderUnavailable);
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed userinfo response");
            AuthError::ProviderUnavailable
        })
    }
}

/// A freshly issued state and the provider URL carrying it.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    pub state: String,
    pub redirect_url: String,
}

/// A completed federated login.
#[derive(Debug, Clone)]
pub struct FederatedLogin {
    pub session: Session,
    /// Web client URL carrying the access token.
    pub redirect_url: String,
}

pub struct FederatedController {
    name: &'static str,
    provider: Option<Arc<dyn IdentityProvider>>,
    sessions: Arc<SessionController>,
    frontend_origin: String,
}

impl FederatedController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionController>,
        frontend_origin: impl Into<String>,
    ) -> Self {
        Self {
            name: provider.name(),
            provider: Some(provider),
            sessions,
            frontend_origin: frontend_origin.into(),
        }
    }

    /// A controller whose every call fails with `NotConfigured`.
    pub fn unconfigured(
        name: &'static str,
        sessions: Arc<SessionController>,
        frontend_origin: impl Into<String>,
    ) -> Self {
        Self {
            name,
            provider: None,
            sessions,
            frontend_origin: frontend_origin.into(),
        }
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.provider
            .as_ref()
            .ok_or(AuthError::NotConfigured(self.name))
    }

    pub fn start(&self) -> Result<OAuthStart, AuthError> {
        let provider = self.provider()?;
        let state = random_state();
        let redirect_url = provider.authorize_url(&state);
        Ok(OAuthStart {
            state,
            redirect_url,
        })
    }

    /// Finish the handshake and open a session for the resolved local user.
    pub async fn callback(
        &self,
        state_param: &str,
        state_held: Option<&str>,
        code: &str,
    ) -> Result<FederatedLogin, AuthError> {
        if !states_match(state_param, state_held) {
            warn!(provider = self.name, "OAuth state mismatch");
            return Err(AuthError::InvalidState);
        }
        let provider = self.provider()?;
        if code.is_empty() {
            return Err(AuthError::ExchangeFailed);
        }

        let provider_token = provider.exchange_code(code).await?;
        let profile = provider.fetch_profile(&provider_token).await?;

        if profile.email.trim().is_empty() || !profile.email_verified || profile.sub.is_empty() {
            warn!(provider = self.name, "Provider profile lacks a verified email");
            return Err(AuthError::InvalidProfile);
        }

        let auth = self
            .sessions
            .find_or_create_federated(&profile.email, provider.name(), &profile.sub)
            .await?;
        let session = self.sessions.start_session(auth).await?;
        info!(user_id = %session.auth.user.id, provider = self.name, "Federated login");

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("token", &session.access_token.token)
            .finish();
        let redirect_url = format!(
            "{}/oauth/callback?{}",
            self.frontend_origin.trim_end_matches('/'),
            query
        );

        Ok(FederatedLogin {
            session,
            redirect_url,
        })
    }
}

fn states_match(param: &str, held: Option<&str>) -> bool {
    match held {
        Some(held) => !param.is_empty() && !held.is_empty() && param.as_bytes() == held.as_bytes(),
        None => false,
    }
}

/// 32 bytes from the thread-local CSPRNG, base64url without padding.
pub fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
