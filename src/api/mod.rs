mod admin;
mod auth;
mod error;
mod google;
mod user;

use axum::Router;
use std::sync::Arc;

use crate::config::CookieConfig;
use crate::federated::FederatedController;
use crate::impl_has_auth_backend;
use crate::session::SessionController;
use crate::store::IdentityStore;

pub use error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionController>,
    pub federated: Arc<FederatedController>,
    pub users: Arc<dyn IdentityStore>,
    pub cookies: Arc<CookieConfig>,
}

impl_has_auth_backend!(ApiState);

/// Create the API router. Mounted under `/api`.
pub fn create_api_router(state: ApiState) -> Router {
    let auth_routes = auth::router(state.clone()).nest("/google", google::router(state.clone()));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/user", user::router(state.clone()))
        .nest("/admin", admin::router(state))
}
