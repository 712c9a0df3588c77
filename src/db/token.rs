//! Refresh token rows keyed by JTI.
//!
//! Only refresh tokens are stored. Access tokens are stateless and bounded by
//! their TTL. Rows are revoked, never deleted.

use async_trait::async_trait;
use sqlx::Sqlite;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::store::{RefreshToken, RefreshTokenStore, StoreError};

#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: String,
    user_id: String,
    jti: String,
    revoked: i64,
    expires_at: i64,
    created_at: i64,
}

impl TryFrom<TokenRow> for RefreshToken {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let parse = |field: &str, value: &str| {
            Uuid::parse_str(value)
                .map_err(|e| StoreError::Backend(format!("corrupt {} {}: {}", field, value, e)))
        };
        Ok(Self {
            id: parse("id", &row.id)?,
            user_id: parse("user_id", &row.user_id)?,
            jti: parse("jti", &row.jti)?,
            revoked: row.revoked != 0,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

async fn insert_row<'e, E>(executor: E, token: &RefreshToken) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, jti, revoked, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(token.id.to_string())
    .bind(token.user_id.to_string())
    .bind(token.jti.to_string())
    .bind(token.revoked)
    .bind(token.expires_at)
    .bind(token.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for TokenStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError> {
        insert_row(&self.pool, token).await?;
        Ok(())
    }

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT id, user_id, jti, revoked, expires_at, created_at FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RefreshToken::try_from).transpose()
    }

    async fn revoke_by_jti(&self, jti: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ? AND revoked = 0")
            .bind(jti.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
                .bind(user_id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old_jti: Uuid,
        now: i64,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The conditional update is the compare-and-swap: of two concurrent
        // rotations of the same JTI only one sees revoked = 0.
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1
             WHERE jti = ? AND revoked = 0 AND expires_at > ?",
        )
        .bind(old_jti.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Dropping `tx` on error rolls the revocation back.
        insert_row(&mut *tx, replacement).await?;
        tx.commit().await?;
        Ok(true)
    }
}
