use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::token_codec::TokenError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Too many failed login attempts")]
    RateLimited,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable discriminant for the error body.
    fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "persistence_failure",
            AppError::Validation(_) => "validation_error",
            AppError::PasswordHash(_) => "persistence_failure",
            AppError::Token(_) => "unauthorized",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidRefreshToken => "invalid_refresh_token",
            AppError::RateLimited => "rate_limited",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::EmailTaken => "email_taken",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(err) => {
                // Detailed store errors are logged server-side only.
                tracing::error!("Database error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, format_validation_errors(errors))
            }
            AppError::PasswordHash(err) => {
                tracing::error!("Password hashing error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Token(err) => {
                tracing::debug!("Token rejected: {}", err);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            // Deliberately indistinct between unknown email and wrong password.
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }
            AppError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Invalid or expired refresh token".to_string())
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many failed login attempts, try again later".to_string(),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::EmailTaken => {
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let msg = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            format!("{field}: {msg}")
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = self.status_and_message();

        let body = Json(json!({
            "status": "error",
            "error": {
                "type": kind,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// `Json` with the rejection routed through [`AppError`], so a missing or
/// malformed request body answers 400 with the standard error envelope
/// instead of axum's bare 422.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::InvalidCredentials.status_and_message().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RateLimited.status_and_message().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::InvalidRefreshToken.status_and_message().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::EmailTaken.status_and_message().0, StatusCode::CONFLICT);
        assert_eq!(
            AppError::Token(TokenError::Expired).status_and_message().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_and_message().0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn credentials_message_does_not_leak_which_part_failed() {
        let (_, msg) = AppError::InvalidCredentials.status_and_message();
        assert!(!msg.to_lowercase().contains("user"));
        assert!(!msg.to_lowercase().contains("not found"));
    }
}
