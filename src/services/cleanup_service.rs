/// Scheduled reclamation of expired persisted state.
///
/// Every job follows one shape: acquire the task's cron lock (skip when
/// another instance holds it), run all deletions inside one transaction,
/// write a structured run record, release the lock no matter what.
use serde_json::{json, Value};
use sqlx::{query, PgPool};
use std::{sync::Arc, time::Duration};

use crate::middleware::error_handling::Result;
use crate::repositories::{BlacklistRepository, RefreshTokenRepository};
use crate::services::webhook_service::WebhookService;
use crate::utils::cron_lock::{acquire_lock, release_lock};

const LOCK_STALE_SECS: i64 = 600;
const LOCK_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupJob {
    Auth,
    Cash,
    Notifications,
    Reservations,
    User,
    LogsRetention,
    MenuCache,
}

impl CleanupJob {
    pub const ALL: [CleanupJob; 7] = [
        CleanupJob::Auth,
        CleanupJob::Cash,
        CleanupJob::Notifications,
        CleanupJob::Reservations,
        CleanupJob::User,
        CleanupJob::LogsRetention,
        CleanupJob::MenuCache,
    ];

    pub fn task_name(&self) -> &'static str {
        match self {
            CleanupJob::Auth => "auth_cleanup",
            CleanupJob::Cash => "cash_cleanup",
            CleanupJob::Notifications => "notifications_cleanup",
            CleanupJob::Reservations => "reservations_cleanup",
            CleanupJob::User => "user_cleanup",
            CleanupJob::LogsRetention => "logs_retention_cleanup",
            CleanupJob::MenuCache => "menu_cache_cleanup",
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            CleanupJob::Auth => Duration::from_secs(15 * 60),
            CleanupJob::MenuCache => Duration::from_secs(10 * 60),
            _ => Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronOutcome {
    Skipped,
    Success,
    Failed,
}

impl CronOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CronOutcome::Skipped => "SKIPPED",
            CronOutcome::Success => "SUCCESS",
            CronOutcome::Failed => "FAILED",
        }
    }
}

pub struct CleanupService {
    pool: PgPool,
    instance_id: String,
    webhook: WebhookService,
}

impl CleanupService {
    pub fn new(pool: PgPool, instance_id: String, webhook: WebhookService) -> Self {
        Self {
            pool,
            instance_id,
            webhook,
        }
    }

    pub async fn run_job(&self, job: CleanupJob) -> CronOutcome {
        let task = job.task_name();

        match acquire_lock(&self.pool, task, &self.instance_id, LOCK_STALE_SECS, LOCK_MAX_RETRIES).await {
            Ok(true) => {}
            Ok(false) => {
                self.record_run(task, CronOutcome::Skipped, json!({ "reason": "lock held" }))
                    .await;
                return CronOutcome::Skipped;
            }
            Err(err) => {
                self.record_run(
                    task,
                    CronOutcome::Failed,
                    json!({ "error": format!("lock acquisition failed: {err}") }),
                )
                .await;
                return CronOutcome::Failed;
            }
        }

        let result = self.run_deletions(job).await;

        // Guaranteed release, success or not. The run record below still
        // reflects the deletion outcome even if this delete fails.
        if let Err(err) = release_lock(&self.pool, task).await {
            tracing::error!("Failed to release lock '{}': {}", task, err);
        }

        match result {
            Ok(details) => {
                self.record_run(task, CronOutcome::Success, details.clone()).await;
                if job == CleanupJob::Auth {
                    self.webhook.send("auth_cleanup.completed", details);
                }
                CronOutcome::Success
            }
            Err(err) => {
                let details = json!({ "error": err.to_string() });
                self.record_run(task, CronOutcome::Failed, details.clone()).await;
                if job == CleanupJob::Auth {
                    self.webhook.send("auth_cleanup.failed", details);
                }
                CronOutcome::Failed
            }
        }
    }

    /// All of a job's deletions commit or roll back together.
    async fn run_deletions(&self, job: CleanupJob) -> Result<Value> {
        let mut tx = self.pool.begin().await?;

        let details = match job {
            CleanupJob::Auth => {
                let refresh_repo = RefreshTokenRepository::new(self.pool.clone());
                let blacklist_repo = BlacklistRepository::new(self.pool.clone());
                let refresh_deleted = refresh_repo.delete_expired(&mut tx).await?;
                let blacklist_deleted = blacklist_repo.delete_expired(&mut tx).await?;
                json!({
                    "expired_refresh_tokens": refresh_deleted,
                    "expired_blacklist_entries": blacklist_deleted,
                })
            }
            CleanupJob::Cash => {
                let deleted = query(
                    "DELETE FROM cash_sessions WHERE closed_at IS NOT NULL AND closed_at < NOW() - INTERVAL '90 days'",
                )
                .execute(&mut *tx)
                .await?
                .rows_affected();
                json!({ "closed_cash_sessions": deleted })
            }
            CleanupJob::Notifications => {
                let deleted = query(
                    "DELETE FROM notifications WHERE read_at IS NOT NULL AND read_at < NOW() - INTERVAL '30 days'",
                )
                .execute(&mut *tx)
                .await?
                .rows_affected();
                json!({ "read_notifications": deleted })
            }
            CleanupJob::Reservations => {
                let deleted = query(
                    r#"
                    DELETE FROM reservations
                    WHERE status IN ('completed', 'cancelled', 'no_show')
                      AND reserved_for < NOW() - INTERVAL '30 days'
                    "#,
                )
                .execute(&mut *tx)
                .await?
                .rows_affected();
                json!({ "finished_reservations": deleted })
            }
            CleanupJob::User => {
                // Only long-deactivated customer accounts; staff rows are
                // kept for bookkeeping references.
                let deleted = query(
                    r#"
                    DELETE FROM users
                    WHERE is_active = FALSE
                      AND role = 'customer'
                      AND updated_at < NOW() - INTERVAL '365 days'
                    "#,
                )
                .execute(&mut *tx)
                .await?
                .rows_affected();
                json!({ "deactivated_customers": deleted })
            }
            CleanupJob::LogsRetention => {
                let cron_logs = query("DELETE FROM cron_run_logs WHERE ran_at < NOW() - INTERVAL '90 days'")
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                let audit_logs =
                    query("DELETE FROM auth_audit_log WHERE created_at < NOW() - INTERVAL '180 days'")
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                json!({ "cron_run_logs": cron_logs, "auth_audit_logs": audit_logs })
            }
            CleanupJob::MenuCache => {
                let deleted = query("DELETE FROM menu_item_cache WHERE expires_at < NOW()")
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                json!({ "expired_menu_cache_entries": deleted })
            }
        };

        tx.commit().await?;
        Ok(details)
    }

    /// One structured record per run. Best-effort: a failed insert is
    /// logged but never changes the job outcome.
    async fn record_run(&self, task: &str, outcome: CronOutcome, details: Value) {
        match outcome {
            CronOutcome::Failed => {
                tracing::error!("Cron run {} -> {}: {}", task, outcome.as_str(), details)
            }
            _ => tracing::info!("Cron run {} -> {}: {}", task, outcome.as_str(), details),
        }

        let result = query("INSERT INTO cron_run_logs (task_name, outcome, details) VALUES ($1, $2, $3)")
            .bind(task)
            .bind(outcome.as_str())
            .bind(&details)
            .execute(&self.pool)
            .await;

        if let Err(err) = result {
            tracing::error!("Failed to persist cron run record for '{}': {}", task, err);
        }
    }
}

/// One loop per job; each instance contends for the per-task lock, so
/// schedules can overlap across processes without double-processing.
pub fn spawn_scheduler(service: Arc<CleanupService>) {
    for job in CleanupJob::ALL {
        let service = service.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(job.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so startup isn't a
            // thundering herd of deletions.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                service.run_job(job).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn task_names_are_unique() {
        let names: HashSet<_> = CleanupJob::ALL.iter().map(|j| j.task_name()).collect();
        assert_eq!(names.len(), CleanupJob::ALL.len());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(CronOutcome::Skipped.as_str(), "SKIPPED");
        assert_eq!(CronOutcome::Success.as_str(), "SUCCESS");
        assert_eq!(CronOutcome::Failed.as_str(), "FAILED");
    }

    #[test]
    fn auth_and_menu_cache_run_more_often_than_retention_jobs() {
        assert!(CleanupJob::Auth.interval() < CleanupJob::LogsRetention.interval());
        assert!(CleanupJob::MenuCache.interval() < CleanupJob::Reservations.interval());
    }
}
