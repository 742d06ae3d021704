pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use config::AppConfig;
use handlers::auth::{
    get_token, list_sessions, login, logout, logout_all, logout_others, refresh_token, register,
    revoke_session,
};
use middleware::auth_middleware;
use services::{
    AuthAuditService, InsecureTestCodec, LoginLimiter, MemoryAttemptCache, SignedCodec, TokenCodec,
};

/// Codec selection happens exactly once, at startup. Request handling never
/// branches between the signed and unsigned paths.
pub fn build_codec(config: &AppConfig) -> Arc<dyn TokenCodec> {
    if config.allow_insecure_test_tokens {
        tracing::warn!("ALLOW_INSECURE_TEST_TOKENS is enabled; issuing UNSIGNED tokens");
        Arc::new(InsecureTestCodec)
    } else {
        Arc::new(SignedCodec::new(&config.jwt_secret))
    }
}

pub fn create_app(config: AppConfig) -> Router {
    let codec = build_codec(&config);
    let limiter = LoginLimiter::new(Arc::new(MemoryAttemptCache::new()));
    let audit = Arc::new(AuthAuditService::new(config.database_pool.clone()));

    let cors_origins: Vec<axum::http::HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, err);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let session_routes = Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", delete(revoke_session))
        .route("/logout-all", post(logout_all))
        .route("/logout-others", post(logout_others))
        .layer(axum_middleware::from_fn_with_state(config.clone(), auth_middleware));

    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .merge(session_routes);

    let user_routes = Router::new()
        .route("/me/token", get(get_token))
        .layer(axum_middleware::from_fn_with_state(config.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .with_state(config)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(Extension(codec))
                .layer(Extension(limiter))
                .layer(Extension(audit)),
        )
}
