use chrono::{DateTime, Utc};
use sqlx::{query, query_as, PgPool};
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::session::{RefreshTokenRow, SessionInfo};

/// Fields of a refresh-token row to be persisted. The raw token is hashed
/// by the caller before it ever reaches this repository.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

pub struct RefreshTokenRepository {
    pool: PgPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, token: &NewRefreshToken) -> Result<RefreshTokenRow> {
        let row = query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, user_agent, ip)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, expires_at, created_at, user_agent, ip
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(&token.user_agent)
        .bind(&token.ip)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Look up a stored row by hash, ignoring rows that have already
    /// expired. A missing or expired row both read as `None`.
    pub async fn find_valid(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        let row = query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at, user_agent, ip
            FROM refresh_tokens
            WHERE token_hash = $1 AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Rotation: delete the presented row and persist its replacement in
    /// one transaction, so a failure on either side leaves the old token
    /// intact rather than stranding the user with no valid refresh token.
    pub async fn rotate(&self, old_id: Uuid, replacement: &NewRefreshToken) -> Result<RefreshTokenRow> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(old_id)
            .execute(&mut *tx)
            .await?;

        let row = query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, user_agent, ip)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, expires_at, created_at, user_agent, ip
            "#,
        )
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(&replacement.user_agent)
        .bind(&replacement.ip)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    pub async fn delete_by_hash(&self, token_hash: &str) -> Result<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_all_except(&self, user_id: Uuid, keep_hash: &str) -> Result<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE user_id = $1 AND token_hash <> $2")
            .bind(user_id)
            .bind(keep_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Scoped to the owning user; a row id belonging to someone else is
    /// simply not matched.
    pub async fn delete_by_id_scoped(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = query("DELETE FROM refresh_tokens WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Newest-expiry first, offset pagination. Exposes device metadata
    /// only; the token hash never leaves the repository layer.
    pub async fn list_page(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<SessionInfo>> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;

        let sessions = query_as::<_, SessionInfo>(
            r#"
            SELECT id, user_agent, ip, created_at, expires_at
            FROM refresh_tokens
            WHERE user_id = $1
            ORDER BY expires_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    pub async fn delete_expired(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE expires_at <= NOW()")
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}
