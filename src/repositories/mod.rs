pub mod blacklist_repo;
pub mod refresh_token_repo;
pub mod user_repo;

pub use blacklist_repo::BlacklistRepository;
pub use refresh_token_repo::{NewRefreshToken, RefreshTokenRepository};
pub use user_repo::UserRepository;
