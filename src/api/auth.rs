//! Password login and refresh-token session endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::error::ApiError;
use crate::auth::{Bearer, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
use crate::clock::unix_now;
use crate::config::CookieConfig;
use crate::error::AuthError;
use crate::session::Session;
use crate::store::{AuthUser, User};

const MIN_PASSWORD_LENGTH: usize = 8;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", post(me).get(me))
        .with_state(state)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

impl CredentialsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::bad_request("a valid email is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::bad_request(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SessionResponse {
    access_token: String,
    user: User,
    roles: Vec<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: u64,
}

/// JSON body plus the refresh cookie for a newly opened or rotated session.
fn session_response(cookies: &CookieConfig, session: Session) -> Response {
    let max_age = session.refresh_token.expires_at as i64 - unix_now();
    let cookie = refresh_cookie(cookies, &session.refresh_token.token, max_age);
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(SessionResponse {
            access_token: session.access_token.token,
            user: session.auth.user,
            roles: session.auth.roles,
        }),
    )
        .into_response()
}

async fn register(
    State(state): State<ApiState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let auth: AuthUser = state
        .sessions
        .register(&payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

async fn login(
    State(state): State<ApiState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    // Shape checks only; a short password is still just a wrong password.
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AuthError::InvalidCredentials.into());
    }
    let session = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;
    Ok(session_response(&state.cookies, session))
}

async fn refresh(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty()) else {
        return ApiError::unauthorized("missing refresh token").into_response();
    };

    match state.sessions.refresh(token).await {
        Ok(session) => session_response(&state.cookies, session),
        Err(e) => {
            let retryable = e.is_retryable();
            let error = ApiError::from(e).into_response();
            if retryable {
                // The presented token is still live; keep the cookie.
                return error;
            }
            (
                AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie(&state.cookies))]),
                error,
            )
                .into_response()
        }
    }
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        state.sessions.logout(token).await;
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie(&state.cookies))]),
        Json(MessageResponse {
            message: "logged out",
        }),
    )
}

async fn logout_all(
    State(state): State<ApiState>,
    Bearer(claims): Bearer,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.sessions.logout_all(claims.sub).await?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie(&state.cookies))]),
        Json(LogoutAllResponse { revoked }),
    ))
}

async fn me(
    State(state): State<ApiState>,
    Bearer(claims): Bearer,
) -> Result<Json<AuthUser>, ApiError> {
    Ok(Json(state.sessions.me(claims.sub).await?))
}
