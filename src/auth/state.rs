//! State trait the authentication extractors depend on.

use crate::session::SessionController;

/// Implemented by router state types so the extractors can verify tokens.
pub trait HasAuthBackend {
    fn sessions(&self) -> &SessionController;
}

/// Implement `HasAuthBackend` for a state struct with a
/// `sessions: Arc<SessionController>` field.
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::SessionController {
                &self.sessions
            }
        }
    };
}
