//! In-process store implementations.
//!
//! Each store keeps its state behind one mutex, so every trait method is a
//! single critical section. That gives `rotate` the same compare-and-swap
//! behaviour as the SQL conditional update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    IdentityStore, RefreshToken, RefreshTokenStore, Role, SEEDED_ROLES, StoreError, User,
    normalize_email,
};
use crate::clock::unix_now;

struct IdentityState {
    users: HashMap<Uuid, User>,
    roles: Vec<Role>,
    user_roles: HashMap<Uuid, Vec<i64>>,
}

pub struct MemoryIdentityStore {
    state: Mutex<IdentityState>,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        let roles = SEEDED_ROLES
            .iter()
            .enumerate()
            .map(|(i, name)| Role {
                id: i as i64 + 1,
                name: name.to_string(),
            })
            .collect();
        Self {
            state: Mutex::new(IdentityState {
                users: HashMap::new(),
                roles,
                user_roles: HashMap::new(),
            }),
        }
    }

    /// Remove a user and their role links. Used to simulate a user vanishing.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        state.user_roles.remove(&id);
        state.users.remove(&id).is_some()
    }

    fn insert_user(state: &mut IdentityState, user: User) -> Result<User, StoreError> {
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let now = unix_now();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash: Some(password_hash.to_string()),
            provider: None,
            provider_subject: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        Self::insert_user(&mut state, user)
    }

    async fn create_federated(
        &self,
        email: &str,
        provider: &str,
        provider_subject: &str,
    ) -> Result<User, StoreError> {
        let now = unix_now();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash: None,
            provider: Some(provider.to_string()),
            provider_subject: Some(provider_subject.to_string()),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        Self::insert_user(&mut state, user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let mut ids = state.user_roles.get(&user_id).cloned().unwrap_or_default();
        ids.sort_unstable();
        Ok(ids
            .iter()
            .filter_map(|id| state.roles.iter().find(|r| r.id == *id))
            .map(|r| r.name.clone())
            .collect())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let role_id = state
            .roles
            .iter()
            .find(|r| r.name == role)
            .map(|r| r.id)
            .ok_or(StoreError::NotFound)?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let held = state.user_roles.entry(user_id).or_default();
        if !held.contains(&role_id) {
            held.push(role_id);
        }
        Ok(())
    }

    async fn all_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.state.lock().await.roles.clone())
    }
}

/// Refresh-token rows keyed by JTI.
#[derive(Default)]
pub struct MemoryRefreshStore {
    rows: Mutex<HashMap<Uuid, RefreshToken>>,
    fail_inserts: AtomicBool,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert (including the one inside `rotate`) fail
    /// with a backend error until switched off again.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    fn check_insert(
        &self,
        rows: &HashMap<Uuid, RefreshToken>,
        token: &RefreshToken,
    ) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert rejected".into()));
        }
        if rows.contains_key(&token.jti) {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        self.check_insert(&rows, token)?;
        rows.insert(token.jti, token.clone());
        Ok(())
    }

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.rows.lock().await.get(&jti).cloned())
    }

    async fn revoke_by_jti(&self, jti: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&jti) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().await;
        let mut count = 0;
        for row in rows.values_mut().filter(|r| r.user_id == user_id) {
            if !row.revoked {
                row.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn rotate(
        &self,
        old_jti: Uuid,
        now: i64,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let live = rows.get(&old_jti).is_some_and(|r| r.is_live(now));
        if !live {
            return Ok(false);
        }
        self.check_insert(&rows, replacement)?;
        if let Some(old) = rows.get_mut(&old_jti) {
            old.revoked = true;
        }
        rows.insert(replacement.jti, replacement.clone());
        Ok(true)
    }
}
