//! HTTP-side authentication: bearer extraction, role guards and cookies.
//!
//! Short-lived access tokens travel in the `Authorization` header. The
//! refresh token lives in an HttpOnly cookie scoped to the refresh and
//! logout paths.

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{
    REFRESH_COOKIE_NAME, STATE_COOKIE_NAME, STATE_COOKIE_PATH, clear_refresh_cookie,
    clear_state_cookie, get_cookie, refresh_cookie, state_cookie,
};
pub use errors::AuthRejection;
pub use extractors::{Admin, AdminOnly, Bearer, RequireRole, RoleConstraint};
pub use state::HasAuthBackend;
