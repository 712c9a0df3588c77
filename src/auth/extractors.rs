//! Axum extractors for bearer authentication and role checks.
//!
//! Access tokens are verified statelessly: no store lookup happens per
//! request, so revocation takes effect when the access token expires.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::debug;

use super::errors::AuthRejection;
use super::state::HasAuthBackend;
use crate::jwt::AccessClaims;

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for endpoints that require a valid access token.
pub struct Bearer(pub AccessClaims);

impl<S> FromRequestParts<S> for Bearer
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthRejection::MissingToken)?;
        let claims = state.sessions().verify_access(token).map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            AuthRejection::InvalidToken
        })?;
        Ok(Bearer(claims))
    }
}

/// A role name checked by [`RequireRole`].
pub trait RoleConstraint {
    const ROLE: &'static str;
}

pub struct Admin;

impl RoleConstraint for Admin {
    const ROLE: &'static str = "admin";
}

/// Extractor for endpoints that require a valid access token carrying role `R`.
pub struct RequireRole<R: RoleConstraint>(pub AccessClaims, PhantomData<R>);

impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Bearer(claims) = Bearer::from_request_parts(parts, state).await?;
        if !claims.roles.iter().any(|role| role == R::ROLE) {
            return Err(AuthRejection::InsufficientRole);
        }
        Ok(RequireRole(claims, PhantomData))
    }
}

pub type AdminOnly = RequireRole<Admin>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(Some("abc"))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
