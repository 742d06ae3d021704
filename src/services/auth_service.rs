use std::sync::Arc;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::session::SessionsPage;
use crate::models::user::{LoginRequest, RegisterRequest, User, UserResponse, UserRole};
use crate::repositories::{BlacklistRepository, NewRefreshToken, RefreshTokenRepository, UserRepository};
use crate::services::login_limiter::LoginLimiter;
use crate::services::token_codec::{hash_token, parse_expiration, IssuedToken, TokenCodec, TokenSubject};
use crate::utils::log_sanitizer::sanitize_for_log;

/// Request-scoped client metadata persisted alongside refresh tokens.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access: IssuedToken,
    /// Absent on /refresh-token when rotation is disabled.
    pub refresh: Option<IssuedToken>,
}

pub struct AuthService {
    user_repo: UserRepository,
    refresh_repo: RefreshTokenRepository,
    blacklist_repo: BlacklistRepository,
    codec: Arc<dyn TokenCodec>,
    limiter: LoginLimiter,
    access_ttl: String,
    refresh_ttl: String,
    rotation_enabled: bool,
}

impl AuthService {
    pub fn new(
        pool: sqlx::PgPool,
        codec: Arc<dyn TokenCodec>,
        limiter: LoginLimiter,
        access_ttl: String,
        refresh_ttl: String,
        rotation_enabled: bool,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            blacklist_repo: BlacklistRepository::new(pool),
            codec,
            limiter,
            access_ttl,
            refresh_ttl,
            rotation_enabled,
        }
    }

    /// Issue an access/refresh pair and persist the hashed refresh token.
    /// A persistence failure here propagates: the client must never hold a
    /// refresh cookie the server does not know about.
    async fn issue_pair(&self, user: &User, meta: &RequestMeta) -> Result<AuthTokens> {
        let subject = TokenSubject::from(user);
        let access = self.codec.generate(&subject, &self.access_ttl)?;
        let refresh = self.codec.generate(&subject, &self.refresh_ttl)?;

        self.refresh_repo
            .create(&NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&refresh.token),
                expires_at: refresh.expires_at,
                user_agent: meta.user_agent.clone(),
                ip: meta.ip.clone(),
            })
            .await?;

        Ok(AuthTokens {
            access,
            refresh: Some(refresh),
        })
    }

    pub async fn register(
        &self,
        request: RegisterRequest,
        meta: &RequestMeta,
    ) -> Result<(UserResponse, AuthTokens)> {
        if self.user_repo.email_exists(&request.email).await? {
            return Err(AppError::EmailTaken);
        }

        let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)?;
        let user = self
            .user_repo
            .create(&request, &password_hash, UserRole::Customer)
            .await?;

        let tokens = self.issue_pair(&user, meta).await?;

        tracing::info!("New user registered: {}", sanitize_for_log(&user.email));
        Ok((user.into(), tokens))
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<(UserResponse, AuthTokens)> {
        let ip = meta.ip.as_deref().unwrap_or("unknown");
        let attempt_key = LoginLimiter::attempt_key(&request.email, ip);

        // Checked before any user lookup or bcrypt work.
        if self.limiter.is_limited(&attempt_key) {
            return Err(AppError::RateLimited);
        }

        let user = match self.user_repo.find_active_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                self.limiter.record_failure(&attempt_key);
                return Err(AppError::InvalidCredentials);
            }
        };

        if !bcrypt::verify(&request.password, &user.password_hash)? {
            self.limiter.record_failure(&attempt_key);
            return Err(AppError::InvalidCredentials);
        }

        self.limiter.clear(&attempt_key);

        let tokens = self.issue_pair(&user, meta).await?;
        Ok((user.into(), tokens))
    }

    /// Exchange a raw refresh token for a new access token, rotating the
    /// refresh token when rotation is enabled. The rotation delete+insert
    /// is a single transaction in the repository.
    pub async fn refresh(&self, raw_refresh: &str, meta: &RequestMeta) -> Result<AuthTokens> {
        let row = self
            .refresh_repo
            .find_valid(&hash_token(raw_refresh))
            .await?
            .ok_or(AppError::InvalidRefreshToken)?;

        let user = self
            .user_repo
            .find_by_id(row.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::InvalidRefreshToken)?;

        let subject = TokenSubject::from(&user);
        let access = self.codec.generate(&subject, &self.access_ttl)?;

        if !self.rotation_enabled {
            return Ok(AuthTokens { access, refresh: None });
        }

        let refresh = self.codec.generate(&subject, &self.refresh_ttl)?;
        self.refresh_repo
            .rotate(
                row.id,
                &NewRefreshToken {
                    user_id: user.id,
                    token_hash: hash_token(&refresh.token),
                    expires_at: refresh.expires_at,
                    user_agent: meta.user_agent.clone(),
                    ip: meta.ip.clone(),
                },
            )
            .await?;

        Ok(AuthTokens {
            access,
            refresh: Some(refresh),
        })
    }

    /// Blacklist the presented access token and best-effort delete the
    /// presented refresh token. The two are independent: a failure on one
    /// side never prevents the other from being attempted.
    pub async fn logout(&self, raw_access: &str, raw_refresh: Option<&str>) -> Result<()> {
        let expires_at = match self.codec.verify(raw_access) {
            Ok(claims) => claims.expires_at(),
            Err(err) => {
                // Undecodable tokens are still denied: hash the raw value
                // and hold the entry for a full access-token lifetime.
                tracing::warn!("Logout with unverifiable access token: {}", err);
                let ttl = parse_expiration(&self.access_ttl).unwrap_or(900);
                chrono::Utc::now() + chrono::Duration::seconds(ttl)
            }
        };

        let blacklist_result = self.blacklist_repo.blacklist(raw_access, expires_at).await;

        if let Some(raw) = raw_refresh {
            if let Err(err) = self.refresh_repo.delete_by_hash(&hash_token(raw)).await {
                tracing::error!("Refresh token revocation during logout failed: {}", err);
            }
        }

        blacklist_result
    }

    /// Revoke every session of the user and blacklist the current access
    /// token.
    pub async fn logout_all(&self, user_id: Uuid, raw_access: &str) -> Result<u64> {
        let deleted = self.refresh_repo.delete_all_for_user(user_id).await?;
        self.logout(raw_access, None).await?;
        Ok(deleted)
    }

    /// Revoke every session except the one presenting `current_refresh`.
    pub async fn logout_others(&self, user_id: Uuid, current_refresh: &str) -> Result<u64> {
        let deleted = self
            .refresh_repo
            .delete_all_except(user_id, &hash_token(current_refresh))
            .await?;
        Ok(deleted)
    }

    pub async fn list_sessions(&self, user_id: Uuid, page: u32, page_size: u32) -> Result<SessionsPage> {
        let sessions = self.refresh_repo.list_page(user_id, page, page_size).await?;
        let has_more = sessions.len() as u32 == page_size;
        Ok(SessionsPage { sessions, has_more })
    }

    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        let deleted = self.refresh_repo.delete_by_id_scoped(user_id, session_id).await?;
        if !deleted {
            return Err(AppError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }
}
