/// Cooperative lock rows for scheduled maintenance tasks.
///
/// Multiple process instances may fire the same cleanup schedule; a row in
/// `cron_locks` keyed by task name guarantees at most one live executor per
/// task. Crashed holders are tolerated through staleness takeover: a lock
/// older than `stale_secs` is presumed abandoned.
use chrono::{DateTime, Utc};
use sqlx::{query, PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;

use crate::middleware::error_handling::Result;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Unique-constraint conflict (23505) and serialization failure (40001)
/// mean another instance raced us for the same lock row.
fn is_race_code(code: &str) -> bool {
    code == "23505" || code == "40001"
}

fn is_lock_race(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| is_race_code(&code))
        .unwrap_or(false)
}

async fn try_acquire(
    pool: &PgPool,
    task_name: &str,
    instance_id: &str,
    stale_secs: i64,
) -> std::result::Result<bool, sqlx::Error> {
    let existing = query("SELECT instance_id, locked_at FROM cron_locks WHERE task_name = $1")
        .bind(task_name)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = existing {
        let locked_at: DateTime<Utc> = row.try_get("locked_at")?;
        let holder: String = row.try_get("instance_id")?;
        let age_secs = (Utc::now() - locked_at).num_seconds();

        if age_secs <= stale_secs {
            return Ok(false);
        }

        tracing::warn!(
            "Taking over stale lock '{}' held by {} for {}s",
            task_name,
            holder,
            age_secs
        );

        // Guard on locked_at so two takeover attempts can't both delete a
        // lock the other one just re-created.
        query("DELETE FROM cron_locks WHERE task_name = $1 AND locked_at = $2")
            .bind(task_name)
            .bind(locked_at)
            .execute(pool)
            .await?;
    }

    query("INSERT INTO cron_locks (task_name, instance_id, locked_at) VALUES ($1, $2, NOW())")
        .bind(task_name)
        .bind(instance_id)
        .execute(pool)
        .await?;

    Ok(true)
}

/// Returns `Ok(true)` on acquisition (including stale takeover), `Ok(false)`
/// when another instance holds the lock or keeps winning the insert race.
/// Non-race errors propagate once retries are exhausted.
pub async fn acquire_lock(
    pool: &PgPool,
    task_name: &str,
    instance_id: &str,
    stale_secs: i64,
    max_retries: u32,
) -> Result<bool> {
    let mut attempt = 0u32;
    loop {
        match try_acquire(pool, task_name, instance_id, stale_secs).await {
            Ok(acquired) => return Ok(acquired),
            Err(err) if is_lock_race(&err) => {
                if attempt >= max_retries {
                    tracing::debug!(
                        "Lock '{}' contended after {} retries, yielding",
                        task_name,
                        max_retries
                    );
                    return Ok(false);
                }
            }
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err.into());
                }
                tracing::warn!("Lock acquire for '{}' errored, retrying: {}", task_name, err);
            }
        }

        attempt += 1;
        sleep(RETRY_BACKOFF).await;
    }
}

/// Fail safe to "not stale": a lookup error must not make a caller
/// force-unlock a healthy holder.
pub async fn is_lock_stale(pool: &PgPool, task_name: &str, stale_secs: i64) -> bool {
    let row = match query("SELECT locked_at FROM cron_locks WHERE task_name = $1")
        .bind(task_name)
        .fetch_optional(pool)
        .await
    {
        Ok(row) => row,
        Err(err) => {
            tracing::warn!("Stale check for '{}' failed: {}", task_name, err);
            return false;
        }
    };

    match row.map(|r| r.try_get::<DateTime<Utc>, _>("locked_at")) {
        Some(Ok(locked_at)) => (Utc::now() - locked_at).num_seconds() > stale_secs,
        _ => false,
    }
}

/// Idempotent: releasing an absent lock is a no-op.
pub async fn release_lock(pool: &PgPool, task_name: &str) -> Result<()> {
    query("DELETE FROM cron_locks WHERE task_name = $1")
        .bind(task_name)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_codes_are_unique_violation_and_serialization_failure() {
        assert!(is_race_code("23505"));
        assert!(is_race_code("40001"));
        assert!(!is_race_code("23503")); // foreign key violation
        assert!(!is_race_code("42P01")); // undefined table
        assert!(!is_race_code(""));
    }
}
