use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use uuid::Uuid;

use super::ApiState;
use crate::auth::Bearer;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/profile", get(profile))
        .with_state(state)
}

#[derive(Serialize)]
struct ProfileResponse {
    message: &'static str,
    user_id: Uuid,
    roles: Vec<String>,
}

async fn profile(Bearer(claims): Bearer) -> impl IntoResponse {
    Json(ProfileResponse {
        message: "This is a protected user profile endpoint.",
        user_id: claims.sub,
        roles: claims.roles,
    })
}
