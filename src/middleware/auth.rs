use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::middleware::error_handling::AppError;
use crate::repositories::BlacklistRepository;
use crate::services::token_codec::TokenCodec;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Raw bearer token as presented by the client; logout paths need it to
/// blacklist by hash.
#[derive(Clone)]
pub struct RawAccessToken(pub String);

pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Cookie first (primary transport), Authorization header as fallback.
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer)
        .map(|token| token.to_string())
}

pub fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Verifies the access token and rejects blacklisted ones, then exposes
/// `Claims` and `RawAccessToken` to downstream handlers.
pub async fn auth_middleware(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let codec = request
        .extensions()
        .get::<Arc<dyn TokenCodec>>()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("token codec not configured")))?;

    let token = extract_access_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let claims = codec.verify(&token)?;

    // The persisted blacklist is authoritative; no cache shortcut here.
    let blacklist = BlacklistRepository::new(config.database_pool.clone());
    if blacklist.is_blacklisted(&token).await? {
        tracing::warn!("Blocked blacklisted token for user {}", claims.user_id);
        return Err(AppError::Unauthorized);
    }

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(RawAccessToken(token));
    Ok(next.run(request).await)
}

/// Staff gate for the order-status surface.
pub async fn require_staff(request: Request, next: Next) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<crate::services::token_codec::Claims>()
        .ok_or(AppError::Unauthorized)?;

    if !claims.role.is_staff() {
        return Err(AppError::Forbidden("Staff access required".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("accessToken=cookie-token"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        assert_eq!(extract_access_token(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn falls_back_to_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        assert_eq!(extract_access_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn missing_everything_is_none() {
        assert_eq!(extract_access_token(&HeaderMap::new()), None);
        assert_eq!(extract_refresh_token(&HeaderMap::new()), None);
    }

    #[test]
    fn refresh_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refreshToken=r-token; accessToken=a-token"),
        );

        assert_eq!(extract_refresh_token(&headers).as_deref(), Some("r-token"));
    }
}
