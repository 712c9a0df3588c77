#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use serde_json::Value;
use tokenward::config::{AuthConfig, CookieConfig, GoogleConfig, TokenConfig};
use tokenward::db::Database;
use tokenward::error::AuthError;
use tokenward::federated::{IdentityProvider, ProviderProfile};
use tokenward::{ServerConfig, create_app};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        tokens: TokenConfig::new(
            b"test-access-secret-0123456789-abcdef".to_vec(),
            b"test-refresh-secret-0123456789-abcdef".to_vec(),
        ),
        cookies: CookieConfig::default(),
        google: GoogleConfig::default(),
        frontend_origin: "http://localhost:5173".to_string(),
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_provider(None).await
    }

    pub async fn with_provider(provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            db: db.clone(),
            auth: auth_config(),
            identity_provider: provider,
        };
        let app = create_app(&config).expect("Failed to create app");
        Self { app, db }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn register(&self, email: &str, password: &str) -> Response<Body> {
        self.send(json_post(
            "/api/auth/register",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(json_post(
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
    }

    /// Register then log in. Returns the access token and refresh cookie value.
    pub async fn signed_in(&self, email: &str) -> (String, String) {
        self.register(email, PASSWORD).await;
        let response = self.login(email, PASSWORD).await;
        let refresh = cookie_value(&response, "refresh_token").expect("no refresh cookie");
        let json = body_json(response).await;
        (json["access_token"].as_str().unwrap().to_string(), refresh)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header(header::COOKIE, format!("refresh_token={}", refresh_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The `Set-Cookie` header for `name`, if any.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
}

pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    let cookie = set_cookie(response, name)?;
    let value = cookie.split(';').next()?.split_once('=')?.1;
    (!value.is_empty()).then(|| value.to_string())
}

/// Identity provider returning a fixed profile and counting network calls.
pub struct FakeProvider {
    pub profile: Result<ProviderProfile, AuthError>,
    pub exchange_fails: bool,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn verified(email: &str, sub: &str) -> Self {
        Self {
            profile: Ok(ProviderProfile {
                sub: sub.to_string(),
                email: email.to_string(),
                email_verified: true,
                ..Default::default()
            }),
            exchange_fails: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://idp.test/authorize?state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.exchange_fails || code != "good-code" {
            return Err(AuthError::ExchangeFailed);
        }
        Ok("provider-access".to_string())
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.profile {
            Ok(profile) => Ok(profile.clone()),
            Err(AuthError::InvalidProfile) => Err(AuthError::InvalidProfile),
            Err(_) => Err(AuthError::ProviderUnavailable),
        }
    }
}
