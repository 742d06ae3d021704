/// Best-effort audit trail for authentication events. Callers discard the
/// result; a failed audit write must never fail the primary operation.
use sqlx::{query, PgPool};
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::utils::log_sanitizer::sanitize_for_log;

pub struct AuthAuditService {
    pool: PgPool,
}

impl AuthAuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn log_event(
        &self,
        user_id: Option<Uuid>,
        email: &str,
        event: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        query(
            r#"
            INSERT INTO auth_audit_log (user_id, email, event, ip, user_agent)
            VALUES ($1, LOWER($2), $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(event)
        .bind(ip)
        .bind(user_agent)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Auth event {}: {} (user: {:?})",
            event,
            sanitize_for_log(email),
            user_id
        );

        Ok(())
    }

    pub async fn login_success(
        &self,
        user_id: Uuid,
        email: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        self.log_event(Some(user_id), email, "login_success", ip, user_agent)
            .await
    }

    pub async fn login_failed(&self, email: &str, ip: Option<&str>) -> Result<()> {
        self.log_event(None, email, "login_failed", ip, None).await
    }

    pub async fn registered(&self, user_id: Uuid, email: &str, ip: Option<&str>) -> Result<()> {
        self.log_event(Some(user_id), email, "register", ip, None).await
    }

    pub async fn logout(&self, user_id: Uuid, email: &str, event: &str) -> Result<()> {
        self.log_event(Some(user_id), email, event, None, None).await
    }

    pub async fn session_revoked(&self, user_id: Uuid, email: &str) -> Result<()> {
        self.log_event(Some(user_id), email, "session_revoked", None, None)
            .await
    }
}
