use chrono::{DateTime, Utc};
use sqlx::{query, PgPool, Row};

use crate::middleware::error_handling::Result;
use crate::services::token_codec::hash_token;

/// Denylist of revoked access-token hashes, honored until the token's own
/// expiry so the table cannot grow without bound.
pub struct BlacklistRepository {
    pool: PgPool,
}

impl BlacklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_blacklisted(&self, raw_token: &str) -> Result<bool> {
        let row = query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM blacklisted_tokens
                WHERE token_hash = $1 AND expires_at >= NOW()
            ) as blacklisted
            "#,
        )
        .bind(hash_token(raw_token))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<bool, _>("blacklisted").unwrap_or(false))
    }

    /// Idempotent: re-blacklisting the same token just refreshes its expiry.
    pub async fn blacklist(&self, raw_token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        query(
            r#"
            INSERT INTO blacklisted_tokens (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(hash_token(raw_token))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_expired(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64> {
        let result = query("DELETE FROM blacklisted_tokens WHERE expires_at < NOW()")
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}
