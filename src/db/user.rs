use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::clock::unix_now;
use crate::store::{IdentityStore, Role, StoreError, User, normalize_email};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: Option<String>,
    provider: Option<String>,
    provider_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::Backend(format!("corrupt user id {}: {}", row.id, e)))?;
        Ok(Self {
            id,
            email: row.email,
            password_hash: row.password_hash,
            provider: row.provider,
            provider_subject: row.provider_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, provider, provider_id, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, provider, provider_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.provider)
        .bind(&user.provider_subject)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: String,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, clause);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl IdentityStore for UserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let now = unix_now();
        self.insert(User {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash: Some(password_hash.to_string()),
            provider: None,
            provider_subject: None,
            created_at: now,
            updated_at: now,
        })
        .await
    }

    async fn create_federated(
        &self,
        email: &str,
        provider: &str,
        provider_subject: &str,
    ) -> Result<User, StoreError> {
        let now = unix_now();
        self.insert(User {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash: None,
            provider: Some(provider.to_string()),
            provider_subject: Some(provider_subject.to_string()),
            created_at: now,
            updated_at: now,
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("email", normalize_email(email)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT r.name FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = ?
             ORDER BY r.id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), StoreError> {
        let role_id: Option<(i64,)> = sqlx::query_as("SELECT id FROM roles WHERE name = ?")
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;
        let (role_id,) = role_id.ok_or(StoreError::NotFound)?;

        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all_roles(&self) -> Result<Vec<Role>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Role { id, name })
            .collect())
    }
}
