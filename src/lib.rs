pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod federated;
pub mod jwt;
pub mod password;
pub mod session;
pub mod store;

use api::{ApiState, create_api_router};
use axum::{Router, routing::get};
use config::AuthConfig;
use db::Database;
use error::StartupError;
use federated::{FederatedController, GOOGLE, GoogleProvider, IdentityProvider};
use jwt::TokenService;
use session::SessionController;
use std::net::SocketAddr;
use std::sync::Arc;
use store::{IdentityStore, RefreshTokenStore};
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Token secrets and lifetimes, cookie scope, provider credentials
    pub auth: AuthConfig,
    /// Identity provider to use instead of the one built from `auth.google`
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
}

async fn health() -> &'static str {
    "ok"
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, StartupError> {
    config.auth.validate()?;

    let users: Arc<dyn IdentityStore> = Arc::new(config.db.users());
    let refresh_tokens: Arc<dyn RefreshTokenStore> = Arc::new(config.db.tokens());
    let tokens = TokenService::new(&config.auth.tokens);
    let sessions = Arc::new(SessionController::new(
        users.clone(),
        refresh_tokens,
        tokens,
    )?);

    let provider: Option<Arc<dyn IdentityProvider>> = match &config.identity_provider {
        Some(provider) => Some(provider.clone()),
        None if config.auth.google.is_configured() => {
            Some(Arc::new(GoogleProvider::new(config.auth.google.clone())?))
        }
        None => None,
    };
    let origin = config.auth.frontend_origin.clone();
    let federated = match provider {
        Some(provider) => FederatedController::new(provider, sessions.clone(), origin),
        None => {
            info!("Google credentials not set, federated login disabled");
            FederatedController::unconfigured(GOOGLE, sessions.clone(), origin)
        }
    };

    let state = ApiState {
        sessions,
        federated: Arc::new(federated),
        users,
        cookies: Arc::new(config.auth.cookies.clone()),
    };

    Ok(Router::new()
        .route("/health", get(health))
        .nest("/api", create_api_router(state)))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok((handle, local_addr))
}
