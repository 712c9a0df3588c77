//! Google OAuth2 redirect endpoints.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use super::ApiState;
use super::error::ApiError;
use crate::auth::{STATE_COOKIE_NAME, clear_state_cookie, get_cookie, refresh_cookie, state_cookie};
use crate::clock::unix_now;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/start", get(start))
        .route("/callback", get(callback))
        .with_state(state)
}

async fn start(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let start = state.federated.start()?;
    Ok((
        StatusCode::FOUND,
        AppendHeaders([
            (header::LOCATION, start.redirect_url),
            (header::SET_COOKIE, state_cookie(&state.cookies, &start.state)),
        ]),
    ))
}

#[derive(Deserialize)]
struct CallbackParams {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

async fn callback(
    State(state): State<ApiState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let held = get_cookie(&headers, STATE_COOKIE_NAME);
    // The state is single use whatever the outcome.
    let clear_state = (header::SET_COOKIE, clear_state_cookie(&state.cookies));

    match state
        .federated
        .callback(&params.state, held, &params.code)
        .await
    {
        Ok(login) => {
            let refresh = &login.session.refresh_token;
            let max_age = refresh.expires_at as i64 - unix_now();
            (
                StatusCode::FOUND,
                AppendHeaders([
                    (header::LOCATION, login.redirect_url.clone()),
                    (
                        header::SET_COOKIE,
                        refresh_cookie(&state.cookies, &refresh.token, max_age),
                    ),
                    clear_state,
                ]),
            )
                .into_response()
        }
        Err(e) => (AppendHeaders([clear_state]), ApiError::from(e)).into_response(),
    }
}
