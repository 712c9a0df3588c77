//! Register, login, refresh and logout over the store contracts.
//!
//! Refresh tokens move through `issued -> active -> {rotated | revoked}` and
//! implicitly expire. A refresh token is single use: `refresh` revokes the
//! presented JTI in the same atomic step that persists its replacement, and a
//! rotated or revoked JTI is indistinguishable from an unknown one.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::unix_now;
use crate::error::AuthError;
use crate::jwt::{AccessClaims, AccessToken, IssuedRefreshToken, TokenService};
use crate::password::{decoy_hash, hash_password, verify_password};
use crate::store::{
    AuthUser, DEFAULT_ROLE, IdentityStore, RefreshToken, RefreshTokenStore, User, normalize_email,
};

/// Everything a successful login, refresh or federated login hands back.
#[derive(Debug, Clone)]
pub struct Session {
    pub auth: AuthUser,
    pub access_token: AccessToken,
    pub refresh_token: IssuedRefreshToken,
}

pub struct SessionController {
    users: Arc<dyn IdentityStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    tokens: TokenService,
    decoy_hash: String,
    #[cfg(test)]
    password_checks: PasswordChecks,
}

/// Counts of password verifications performed by `login`.
#[cfg(test)]
#[derive(Default)]
struct PasswordChecks {
    total: std::sync::atomic::AtomicUsize,
    decoy: std::sync::atomic::AtomicUsize,
}

impl SessionController {
    pub fn new(
        users: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        tokens: TokenService,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            users,
            refresh_tokens,
            tokens,
            decoy_hash: decoy_hash()?,
            #[cfg(test)]
            password_checks: PasswordChecks::default(),
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create a password account with the default role. Issues no tokens.
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email);
        let hash = hash_blocking(password.to_string()).await?;

        let user = self.users.create(&email, &hash).await?;
        let auth = self.with_default_role(user).await?;
        info!(user_id = %auth.user.id, "User registered");
        Ok(auth)
    }

    /// Exchange email and password for a new session.
    ///
    /// Unknown email, federated-only account and wrong password all fail with
    /// the same `InvalidCredentials` after the same amount of hashing work.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let candidate = self.users.find_by_email(&email).await?;

        let (user, hash) = match candidate {
            Some(user) => match user.password_hash.clone() {
                Some(hash) => (Some(user), hash),
                None => (None, self.decoy_hash.clone()),
            },
            None => (None, self.decoy_hash.clone()),
        };

        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            self.password_checks.total.fetch_add(1, Ordering::SeqCst);
            if user.is_none() {
                self.password_checks.decoy.fetch_add(1, Ordering::SeqCst);
            }
        }

        let matched = verify_blocking(password.to_string(), hash).await?;
        let user = match user {
            Some(user) if matched => user,
            _ => {
                info!("Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let auth = self.with_default_role(user).await?;
        let session = self.start_session(auth).await?;
        info!(user_id = %session.auth.user.id, "User logged in");
        Ok(session)
    }

    /// Issue an access/refresh pair for an already authenticated user and
    /// persist the refresh row as active.
    pub async fn start_session(&self, auth: AuthUser) -> Result<Session, AuthError> {
        let access_token = self.tokens.issue_access_token(auth.user.id, &auth.roles)?;
        let refresh_token = self.tokens.issue_refresh_token(auth.user.id)?;

        let row = RefreshToken::issued(
            auth.user.id,
            refresh_token.jti,
            refresh_token.expires_at as i64,
            refresh_token.issued_at as i64,
        );
        self.refresh_tokens.insert(&row).await?;

        Ok(Session {
            auth,
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token: the presented one dies, a new pair is issued.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let claims = self
            .tokens
            .verify_refresh_token(refresh_token)
            .map_err(|_| AuthError::InvalidCredentials)?;
        let now = unix_now();

        let row = self
            .refresh_tokens
            .find_by_jti(claims.jti)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if row.user_id != claims.user_id || !row.is_live(now) {
            if row.revoked {
                warn!(user_id = %row.user_id, jti = %row.jti, "Revoked refresh token presented");
            }
            return Err(AuthError::InvalidCredentials);
        }

        let Some(user) = self.users.find_by_id(claims.user_id).await? else {
            if let Err(e) = self.refresh_tokens.revoke_by_jti(claims.jti).await {
                warn!(jti = %claims.jti, error = %e, "Failed to revoke token of missing user");
            }
            return Err(AuthError::NotFound);
        };
        let auth = self.with_roles(user).await?;

        let access_token = self.tokens.issue_access_token(auth.user.id, &auth.roles)?;
        let next = self.tokens.issue_refresh_token(auth.user.id)?;
        let next_row = RefreshToken::issued(
            auth.user.id,
            next.jti,
            next.expires_at as i64,
            next.issued_at as i64,
        );

        // Revoke-old and insert-new commit together or not at all, so a failed
        // insert leaves the presented token usable for a retry.
        if !self
            .refresh_tokens
            .rotate(claims.jti, now, &next_row)
            .await?
        {
            warn!(user_id = %auth.user.id, jti = %claims.jti, "Refresh token already rotated");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Session {
            auth,
            access_token,
            refresh_token: next,
        })
    }

    /// Revoke the presented refresh token if it parses. Never fails.
    pub async fn logout(&self, refresh_token: &str) {
        let Ok(claims) = self.tokens.verify_refresh_token(refresh_token) else {
            return;
        };
        match self.refresh_tokens.revoke_by_jti(claims.jti).await {
            Ok(true) => info!(user_id = %claims.user_id, "Session ended"),
            Ok(false) => {}
            Err(e) => warn!(jti = %claims.jti, error = %e, "Failed to revoke refresh token"),
        }
    }

    /// Revoke every refresh token of a user. Access tokens already issued stay
    /// valid until their own expiry.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let count = self.refresh_tokens.revoke_all_for_user(user_id).await?;
        info!(user_id = %user_id, count, "All sessions ended");
        Ok(count)
    }

    pub async fn me(&self, user_id: Uuid) -> Result<AuthUser, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.with_roles(user).await
    }

    /// Resolve a federated identity to a local user, creating one on first login.
    ///
    /// An existing account with the same email is returned as is, whatever
    /// its provider. Accounts are linked by email alone.
    pub async fn find_or_create_federated(
        &self,
        email: &str,
        provider: &str,
        provider_subject: &str,
    ) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email);

        if let Some(user) = self.users.find_by_email(&email).await? {
            if user.provider.as_deref() != Some(provider) {
                warn!(
                    user_id = %user.id,
                    provider,
                    "Federated login linked to existing account by email"
                );
            }
            return self.with_default_role(user).await;
        }

        let user = match self
            .users
            .create_federated(&email, provider, provider_subject)
            .await
        {
            Ok(user) => user,
            // Lost a race with a concurrent first login for the same email.
            Err(crate::store::StoreError::Conflict) => self
                .users
                .find_by_email(&email)
                .await?
                .ok_or(AuthError::NotFound)?,
            Err(e) => return Err(e.into()),
        };
        let auth = self.with_default_role(user).await?;
        info!(user_id = %auth.user.id, provider, "Federated user created");
        Ok(auth)
    }

    /// Verify an access token presented on a protected request.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.verify_access_token(token)
    }

    async fn with_roles(&self, user: User) -> Result<AuthUser, AuthError> {
        let roles = self.users.list_roles(user.id).await?;
        Ok(AuthUser { user, roles })
    }

    /// Like `with_roles`, but grants the default role to a user holding none.
    /// An account left roleless by a failed assignment is repaired here.
    async fn with_default_role(&self, user: User) -> Result<AuthUser, AuthError> {
        let mut auth = self.with_roles(user).await?;
        if auth.roles.is_empty() {
            self.users.assign_role(auth.user.id, DEFAULT_ROLE).await?;
            auth.roles = self.users.list_roles(auth.user.id).await?;
        }
        Ok(auth)
    }
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::store::memory::{MemoryIdentityStore, MemoryRefreshStore};

    struct Harness {
        users: Arc<MemoryIdentityStore>,
        refresh: Arc<MemoryRefreshStore>,
        controller: Arc<SessionController>,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryIdentityStore::new());
        let refresh = Arc::new(MemoryRefreshStore::new());
        let tokens = TokenService::new(&TokenConfig::new(
            b"access-secret-for-tests-0123456789".to_vec(),
            b"refresh-secret-for-tests-0123456789".to_vec(),
        ));
        let controller = SessionController::new(users.clone(), refresh.clone(), tokens).unwrap();
        Harness {
            users,
            refresh,
            controller: Arc::new(controller),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness();
        let registered = h
            .controller
            .register("Alice@Example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(registered.user.email, "alice@example.com");
        assert_eq!(registered.roles, ["user"]);

        let session = h
            .controller
            .login("alice@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(session.auth.user.id, registered.user.id);
        assert!(session.auth.roles.contains(&"user".to_string()));

        let claims = h.controller.verify_access(&session.access_token.token).unwrap();
        assert_eq!(claims.sub, registered.user.id);

        let row = h
            .refresh
            .find_by_jti(session.refresh_token.jti)
            .await
            .unwrap()
            .unwrap();
        assert!(!row.revoked);
        assert_eq!(row.expires_at, session.refresh_token.expires_at as i64);
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        let result = h.controller.register("A@X.COM", "password2").await;
        assert!(matches!(result, Err(AuthError::Conflict)));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        h.controller
            .find_or_create_federated("fed@x.com", "google", "sub-1")
            .await
            .unwrap();

        let wrong_password = h.controller.login("a@x.com", "password2").await;
        let unknown_email = h.controller.login("nobody@x.com", "password1").await;
        let federated_only = h.controller.login("fed@x.com", "").await;

        for result in [wrong_password, unknown_email, federated_only] {
            let err = result.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(err.to_string(), "invalid credentials");
        }
        assert!(h.refresh.is_empty().await);
    }

    #[tokio::test]
    async fn test_every_login_attempt_verifies_a_hash() {
        use std::sync::atomic::Ordering;

        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        h.controller
            .find_or_create_federated("fed@x.com", "google", "sub-1")
            .await
            .unwrap();
        let checks = &h.controller.password_checks;

        h.controller.login("nobody@x.com", "password1").await.unwrap_err();
        assert_eq!(checks.total.load(Ordering::SeqCst), 1);
        assert_eq!(checks.decoy.load(Ordering::SeqCst), 1);

        h.controller.login("fed@x.com", "password1").await.unwrap_err();
        assert_eq!(checks.total.load(Ordering::SeqCst), 2);
        assert_eq!(checks.decoy.load(Ordering::SeqCst), 2);

        h.controller.login("a@x.com", "wrong-password").await.unwrap_err();
        h.controller.login("a@x.com", "password1").await.unwrap();
        assert_eq!(checks.total.load(Ordering::SeqCst), 4);
        assert_eq!(checks.decoy.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_repairs_missing_default_role() {
        let h = harness();
        let hash = hash_password("password1").unwrap();
        let user = h.users.create("a@x.com", &hash).await.unwrap();
        assert!(h.users.list_roles(user.id).await.unwrap().is_empty());

        let session = h.controller.login("a@x.com", "password1").await.unwrap();
        assert_eq!(session.auth.roles, ["user"]);
        assert_eq!(h.users.list_roles(user.id).await.unwrap(), ["user"]);
    }

    #[tokio::test]
    async fn test_federated_login_repairs_missing_default_role() {
        let h = harness();
        let user = h
            .users
            .create_federated("fed@x.com", "google", "sub-1")
            .await
            .unwrap();

        let auth = h
            .controller
            .find_or_create_federated("fed@x.com", "google", "sub-1")
            .await
            .unwrap();
        assert_eq!(auth.user.id, user.id);
        assert_eq!(auth.roles, ["user"]);
    }

    #[tokio::test]
    async fn test_refresh_rotates_on_use() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        let session = h.controller.login("a@x.com", "password1").await.unwrap();

        let rotated = h
            .controller
            .refresh(&session.refresh_token.token)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token.jti, session.refresh_token.jti);
        assert_eq!(rotated.auth.roles, ["user"]);

        let old = h
            .refresh
            .find_by_jti(session.refresh_token.jti)
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);

        let replay = h.controller.refresh(&session.refresh_token.token).await;
        assert!(matches!(replay, Err(AuthError::InvalidCredentials)));

        // The replacement is itself usable exactly once.
        h.controller
            .refresh(&rotated.refresh_token.token)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_one_winner() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();

        for _ in 0..10 {
            let session = h.controller.login("a@x.com", "password1").await.unwrap();
            let token = session.refresh_token.token;

            let (a, b) = {
                let (c1, c2) = (h.controller.clone(), h.controller.clone());
                let (t1, t2) = (token.clone(), token.clone());
                tokio::join!(
                    tokio::spawn(async move { c1.refresh(&t1).await }),
                    tokio::spawn(async move { c2.refresh(&t2).await }),
                )
            };
            let results = [a.unwrap(), b.unwrap()];

            let wins = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1, "exactly one refresh may succeed");
            assert!(
                results
                    .iter()
                    .any(|r| matches!(r, Err(AuthError::InvalidCredentials)))
            );
        }
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_and_revoked() {
        let h = harness();
        assert!(matches!(
            h.controller.refresh("garbage").await,
            Err(AuthError::InvalidCredentials)
        ));

        h.controller.register("a@x.com", "password1").await.unwrap();
        let session = h.controller.login("a@x.com", "password1").await.unwrap();
        h.controller.logout(&session.refresh_token.token).await;

        assert!(matches!(
            h.controller.refresh(&session.refresh_token.token).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_unpersisted_token() {
        let h = harness();
        let user = h.controller.register("a@x.com", "password1").await.unwrap();
        let orphan = h
            .controller
            .tokens()
            .issue_refresh_token(user.user.id)
            .unwrap();

        assert!(matches!(
            h.controller.refresh(&orphan.token).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_row_expired_in_store() {
        let h = harness();
        let user = h.controller.register("a@x.com", "password1").await.unwrap();
        let issued = h
            .controller
            .tokens()
            .issue_refresh_token(user.user.id)
            .unwrap();
        // Row expiry is earlier than the claim's own expiry.
        let row = RefreshToken::issued(user.user.id, issued.jti, unix_now() - 1, unix_now() - 10);
        h.refresh.insert(&row).await.unwrap();

        assert!(matches!(
            h.controller.refresh(&issued.token).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        let session = h.controller.login("a@x.com", "password1").await.unwrap();
        h.users.remove(session.auth.user.id).await;

        let result = h.controller.refresh(&session.refresh_token.token).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn test_failed_rotation_is_retryable() {
        let h = harness();
        h.controller.register("a@x.com", "password1").await.unwrap();
        let session = h.controller.login("a@x.com", "password1").await.unwrap();

        h.refresh.set_fail_inserts(true);
        let err = h
            .controller
            .refresh(&session.refresh_token.token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
        assert!(err.is_retryable());

        h.refresh.set_fail_inserts(false);
        h.controller
            .refresh(&session.refresh_token.token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logout_never_fails() {
        let h = harness();
        h.controller.logout("").await;
        h.controller.logout("garbage").await;

        h.controller.register("a@x.com", "password1").await.unwrap();
        let session = h.controller.login("a@x.com", "password1").await.unwrap();
        h.controller.logout(&session.refresh_token.token).await;
        h.controller.logout(&session.refresh_token.token).await;

        let row = h
            .refresh
            .find_by_jti(session.refresh_token.jti)
            .await
            .unwrap()
            .unwrap();
        assert!(row.revoked);
    }

    #[tokio::test]
    async fn test_logout_all() {
        let h = harness();
        let user = h.controller.register("a@x.com", "password1").await.unwrap();
        let s1 = h.controller.login("a@x.com", "password1").await.unwrap();
        let s2 = h.controller.login("a@x.com", "password1").await.unwrap();

        assert_eq!(h.controller.logout_all(user.user.id).await.unwrap(), 2);
        for s in [s1, s2] {
            assert!(h.controller.refresh(&s.refresh_token.token).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_me() {
        let h = harness();
        let user = h.controller.register("a@x.com", "password1").await.unwrap();

        let me = h.controller.me(user.user.id).await.unwrap();
        assert_eq!(me.user.id, user.user.id);
        assert_eq!(me.roles, ["user"]);

        assert!(matches!(
            h.controller.me(Uuid::new_v4()).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_federated_first_login_and_return() {
        let h = harness();
        let first = h
            .controller
            .find_or_create_federated("new@x.com", "google", "sub123")
            .await
            .unwrap();
        assert!(first.user.password_hash.is_none());
        assert_eq!(first.user.provider.as_deref(), Some("google"));
        assert_eq!(first.user.provider_subject.as_deref(), Some("sub123"));
        assert_eq!(first.roles, ["user"]);

        let second = h
            .controller
            .find_or_create_federated("new@x.com", "google", "sub123")
            .await
            .unwrap();
        assert_eq!(second.user.id, first.user.id);
    }

    #[tokio::test]
    async fn test_federated_links_existing_password_account() {
        let h = harness();
        let local = h.controller.register("a@x.com", "password1").await.unwrap();

        let linked = h
            .controller
            .find_or_create_federated("A@x.com", "google", "sub-9")
            .await
            .unwrap();
        assert_eq!(linked.user.id, local.user.id);
        // The password credential is never overwritten.
        assert!(linked.user.password_hash.is_some());
        assert!(linked.user.provider.is_none());
        h.controller.login("a@x.com", "password1").await.unwrap();
    }
}
