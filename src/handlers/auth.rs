use axum::{
    extract::{ConnectInfo, Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    middleware::{
        auth::{extract_access_token, extract_refresh_token, RawAccessToken, ACCESS_COOKIE, REFRESH_COOKIE},
        error_handling::{AppError, AppJson, Result},
    },
    models::{
        session::SessionsQuery,
        user::{LoginRequest, RegisterRequest},
    },
    services::{
        auth_service::{AuthService, AuthTokens, RequestMeta},
        token_codec::{Claims, IssuedToken, TokenCodec},
        AuthAuditService, LoginLimiter,
    },
};

/// HTTP-only auth cookie; `Secure` follows the TLS setting, `SameSite`
/// strict against CSRF.
fn auth_cookie(name: &'static str, issued: &IssuedToken, secure: bool) -> Cookie<'static> {
    let max_age = (issued.expires_at - Utc::now()).num_seconds().max(0);

    Cookie::build((name, issued.token.clone()))
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .build()
}

/// Expires immediately, clearing the cookie on the client.
fn clear_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build()
}

fn token_jar(tokens: &AuthTokens, secure: bool) -> CookieJar {
    let mut jar = CookieJar::new().add(auth_cookie(ACCESS_COOKIE, &tokens.access, secure));
    if let Some(refresh) = &tokens.refresh {
        jar = jar.add(auth_cookie(REFRESH_COOKIE, refresh, secure));
    }
    jar
}

fn cleared_jar() -> CookieJar {
    CookieJar::new()
        .add(clear_cookie(ACCESS_COOKIE))
        .add(clear_cookie(REFRESH_COOKIE))
}

fn request_meta(addr: &SocketAddr, headers: &HeaderMap) -> RequestMeta {
    RequestMeta {
        ip: Some(addr.ip().to_string()),
        user_agent: headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string()),
    }
}

fn auth_service(config: &AppConfig, codec: Arc<dyn TokenCodec>, limiter: LoginLimiter) -> AuthService {
    AuthService::new(
        config.database_pool.clone(),
        codec,
        limiter,
        config.access_token_ttl.clone(),
        config.refresh_token_ttl.clone(),
        config.refresh_rotation,
    )
}

pub async fn register(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<Response> {
    request.validate()?;

    let meta = request_meta(&addr, &headers);
    let service = auth_service(&config, codec, limiter);

    let (user, tokens) = service.register(request, &meta).await?;
    let _ = audit.registered(user.id, &user.email, meta.ip.as_deref()).await;

    let jar = token_jar(&tokens, config.secure_cookies);
    Ok((StatusCode::CREATED, jar, Json(serde_json::json!({ "user": user }))).into_response())
}

pub async fn login(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Response> {
    request.validate()?;

    let email = request.email.clone();
    let meta = request_meta(&addr, &headers);
    let service = auth_service(&config, codec, limiter);

    match service.login(request, &meta).await {
        Ok((user, tokens)) => {
            let _ = audit
                .login_success(user.id, &email, meta.ip.as_deref(), meta.user_agent.as_deref())
                .await;

            let jar = token_jar(&tokens, config.secure_cookies);
            Ok((StatusCode::OK, jar, Json(serde_json::json!({ "user": user }))).into_response())
        }
        Err(err) => {
            if matches!(err, AppError::InvalidCredentials) {
                let _ = audit.login_failed(&email, meta.ip.as_deref()).await;
            }
            Err(err)
        }
    }
}

pub async fn refresh_token(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response> {
    let raw_refresh = extract_refresh_token(&headers).ok_or(AppError::InvalidRefreshToken)?;

    let meta = request_meta(&addr, &headers);
    let service = auth_service(&config, codec, limiter);

    let tokens = service.refresh(&raw_refresh, &meta).await?;

    let jar = token_jar(&tokens, config.secure_cookies);
    Ok((StatusCode::OK, jar, Json(serde_json::json!({ "status": "ok" }))).into_response())
}

/// Not behind the strict auth middleware: a token that no longer verifies
/// must still end up blacklisted, so presence is the only requirement here.
pub async fn logout(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    headers: HeaderMap,
) -> Result<Response> {
    let raw_access = extract_access_token(&headers).ok_or(AppError::Unauthorized)?;
    let raw_refresh = extract_refresh_token(&headers);

    let claims = codec.verify(&raw_access).ok();

    let service = auth_service(&config, codec, limiter);
    service.logout(&raw_access, raw_refresh.as_deref()).await?;

    if let Some(claims) = claims {
        let _ = audit.logout(claims.user_id, &claims.email, "logout").await;
    }

    Ok((StatusCode::OK, cleared_jar(), Json(serde_json::json!({ "status": "ok" }))).into_response())
}

pub async fn list_sessions(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SessionsQuery>,
) -> Result<Response> {
    let (page, page_size) = query.normalized();
    let service = auth_service(&config, codec, limiter);

    let sessions = service.list_sessions(claims.user_id, page, page_size).await?;
    Ok(Json(sessions).into_response())
}

pub async fn logout_all(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    Extension(claims): Extension<Claims>,
    Extension(RawAccessToken(raw_access)): Extension<RawAccessToken>,
) -> Result<Response> {
    let service = auth_service(&config, codec, limiter);
    let revoked = service.logout_all(claims.user_id, &raw_access).await?;

    let _ = audit.logout(claims.user_id, &claims.email, "logout_all").await;

    Ok((
        StatusCode::OK,
        cleared_jar(),
        Json(serde_json::json!({ "status": "ok", "revoked_sessions": revoked })),
    )
        .into_response())
}

pub async fn logout_others(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<Response> {
    let current_refresh = extract_refresh_token(&headers)
        .ok_or_else(|| AppError::BadRequest("Current refresh token required".to_string()))?;

    let service = auth_service(&config, codec, limiter);
    let revoked = service.logout_others(claims.user_id, &current_refresh).await?;

    let _ = audit.logout(claims.user_id, &claims.email, "logout_others").await;

    Ok(Json(serde_json::json!({ "status": "ok", "revoked_sessions": revoked })).into_response())
}

pub async fn revoke_session(
    State(config): State<AppConfig>,
    Extension(codec): Extension<Arc<dyn TokenCodec>>,
    Extension(limiter): Extension<LoginLimiter>,
    Extension(audit): Extension<Arc<AuthAuditService>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let service = auth_service(&config, codec, limiter);
    service.revoke_session(claims.user_id, session_id).await?;

    let _ = audit.session_revoked(claims.user_id, &claims.email).await;

    Ok(Json(serde_json::json!({ "status": "ok" })).into_response())
}

/// Identity echo of the verified (and non-blacklisted) access token.
pub async fn get_token(Extension(claims): Extension<Claims>) -> Result<Response> {
    Ok(Json(serde_json::json!({
        "user_id": claims.user_id,
        "email": claims.email,
        "role": claims.role,
        "name": claims.name,
        "phone": claims.phone,
        "expires_at": claims.expires_at(),
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued(secs: i64) -> IssuedToken {
        IssuedToken {
            token: "tok".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn auth_cookie_attributes() {
        let cookie = auth_cookie(ACCESS_COOKIE, &issued(900), true);
        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        let max_age = cookie.max_age().unwrap();
        assert!(max_age > time::Duration::seconds(890));
        assert!(max_age <= time::Duration::seconds(900));
    }

    #[test]
    fn expired_issuance_never_yields_negative_max_age() {
        let cookie = auth_cookie(ACCESS_COOKIE, &issued(-100), false);
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_cookie(REFRESH_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn token_jar_skips_refresh_when_not_rotated() {
        let tokens = AuthTokens {
            access: issued(900),
            refresh: None,
        };
        let jar = token_jar(&tokens, false);
        assert!(jar.get(ACCESS_COOKIE).is_some());
        assert!(jar.get(REFRESH_COOKIE).is_none());
    }
}
