pub mod cron_lock;
pub mod log_sanitizer;
