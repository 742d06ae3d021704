pub mod auth;
pub mod error_handling;

pub use auth::{auth_middleware, require_staff, RawAccessToken, ACCESS_COOKIE, REFRESH_COOKIE};
pub use error_handling::{AppError, AppJson, Result};
