//! Cookie parsing and `Set-Cookie` builders for the refresh and OAuth state cookies.

use axum::http::header;

use crate::config::CookieConfig;
use crate::federated::STATE_TTL_SECS;

/// Cookie holding the refresh token. Scoped to the refresh/logout paths.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie holding the OAuth anti-forgery state during the redirect dance.
pub const STATE_COOKIE_NAME: &str = "oauth_state";

pub const STATE_COOKIE_PATH: &str = "/api/auth/google";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=')
            && key.trim() == name
        {
            return Some(value.trim());
        }
    }
    None
}

fn build(config: &CookieConfig, name: &str, value: &str, path: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path={}; Max-Age={}",
        name, value, path, max_age
    );
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// The refresh cookie, living until the token itself expires.
pub fn refresh_cookie(config: &CookieConfig, token: &str, max_age: i64) -> String {
    build(
        config,
        REFRESH_COOKIE_NAME,
        token,
        &config.refresh_path,
        max_age.max(0),
    )
}

pub fn clear_refresh_cookie(config: &CookieConfig) -> String {
    build(config, REFRESH_COOKIE_NAME, "", &config.refresh_path, 0)
}

pub fn state_cookie(config: &CookieConfig, state: &str) -> String {
    build(
        config,
        STATE_COOKIE_NAME,
        state,
        STATE_COOKIE_PATH,
        STATE_TTL_SECS,
    )
}

pub fn clear_state_cookie(config: &CookieConfig) -> String {
    build(config, STATE_COOKIE_NAME, "", STATE_COOKIE_PATH, 0)
}
