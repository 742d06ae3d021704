pub mod audit_service;
pub mod auth_service;
pub mod cleanup_service;
pub mod login_limiter;
pub mod token_codec;
pub mod webhook_service;

pub use audit_service::AuthAuditService;
pub use auth_service::{AuthService, AuthTokens, RequestMeta};
pub use cleanup_service::{CleanupJob, CleanupService, CronOutcome};
pub use login_limiter::{AttemptCache, LoginLimiter, MemoryAttemptCache};
pub use token_codec::{InsecureTestCodec, SignedCodec, TokenCodec};
pub use webhook_service::WebhookService;
