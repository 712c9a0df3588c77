//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::AuthError;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
    BadGateway(String),
    Unavailable(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let message = e.to_string();
        match e {
            AuthError::InvalidCredentials | AuthError::InvalidToken => Self::Unauthorized(message),
            AuthError::Conflict => Self::Conflict(message),
            AuthError::NotFound => Self::NotFound(message),
            AuthError::InvalidState | AuthError::ExchangeFailed | AuthError::InvalidProfile => {
                Self::BadRequest(message)
            }
            AuthError::ProviderUnavailable => Self::BadGateway(message),
            AuthError::NotConfigured(_) => Self::Internal(message),
            AuthError::Persistence(_) => {
                error!("{}", message);
                Self::Unavailable("temporarily unavailable, retry".into())
            }
            AuthError::Signing(_) | AuthError::Hashing(_) => {
                error!("{}", message);
                Self::Internal("internal error".into())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Unavailable(msg) => msg,
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_status() {
        let cases = [
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::Conflict, StatusCode::CONFLICT),
            (AuthError::NotFound, StatusCode::NOT_FOUND),
            (AuthError::InvalidState, StatusCode::BAD_REQUEST),
            (AuthError::ExchangeFailed, StatusCode::BAD_REQUEST),
            (AuthError::InvalidProfile, StatusCode::BAD_REQUEST),
            (AuthError::ProviderUnavailable, StatusCode::BAD_GATEWAY),
            (
                AuthError::NotConfigured("google"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AuthError::Persistence("db".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuthError::Hashing("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_is_not_leaked() {
        match ApiError::from(AuthError::Signing("key material".into())) {
            ApiError::Internal(msg) => assert_eq!(msg, "internal error"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
