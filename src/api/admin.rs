//! Admin API endpoints.
//!
//! All endpoints require the admin role.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use super::ApiState;
use super::error::ApiError;
use crate::auth::AdminOnly;
use crate::error::AuthError;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .with_state(state)
}

/// The role catalogue.
async fn list_roles(
    State(state): State<ApiState>,
    _admin: AdminOnly,
) -> Result<impl IntoResponse, ApiError> {
    let roles = state.users.all_roles().await.map_err(AuthError::from)?;
    Ok(Json(roles))
}
