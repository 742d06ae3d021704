//! Refresh-token store and cron-lock behavior against a real Postgres.
//!
//! These tests run only when `TEST_DATABASE_URL` points at a database the
//! suite may write to; without it each test skips. Rows are keyed with
//! fresh UUIDs so reruns against a shared database do not collide.

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use tavola::middleware::error_handling::AppError;
use tavola::models::user::{RegisterRequest, User, UserRole};
use tavola::repositories::{NewRefreshToken, RefreshTokenRepository, UserRepository};
use tavola::services::token_codec::hash_token;
use tavola::utils::cron_lock::{acquire_lock, is_lock_stale, release_lock};

async fn try_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

fn register_request() -> RegisterRequest {
    RegisterRequest {
        email: format!("{}@tavola.test", Uuid::new_v4()),
        password: "Password1!".to_string(),
        name: "Robin".to_string(),
        phone: None,
    }
}

async fn seed_user(pool: &PgPool) -> User {
    UserRepository::new(pool.clone())
        .create(&register_request(), "$2b$12$test-only-hash", UserRole::Customer)
        .await
        .expect("seed user")
}

fn token_row(user_id: Uuid, raw: &str) -> NewRefreshToken {
    NewRefreshToken {
        user_id,
        token_hash: hash_token(raw),
        expires_at: Utc::now() + Duration::days(7),
        user_agent: Some("session-store-tests".to_string()),
        ip: Some("127.0.0.1".to_string()),
    }
}

#[tokio::test]
async fn rotated_refresh_token_is_single_use() {
    let Some(pool) = try_pool().await else { return };
    let user = seed_user(&pool).await;
    let repo = RefreshTokenRepository::new(pool.clone());

    let raw_old = Uuid::new_v4().to_string();
    let raw_new = Uuid::new_v4().to_string();

    let old = repo.create(&token_row(user.id, &raw_old)).await.unwrap();
    assert!(repo.find_valid(&hash_token(&raw_old)).await.unwrap().is_some());

    repo.rotate(old.id, &token_row(user.id, &raw_new)).await.unwrap();

    // Presenting the rotated-out token again must find nothing.
    assert!(repo.find_valid(&hash_token(&raw_old)).await.unwrap().is_none());
    assert!(repo.find_valid(&hash_token(&raw_new)).await.unwrap().is_some());
}

#[tokio::test]
async fn logout_others_keeps_only_the_current_session() {
    let Some(pool) = try_pool().await else { return };
    let user = seed_user(&pool).await;
    let repo = RefreshTokenRepository::new(pool.clone());

    let raws: Vec<String> = (0..3).map(|_| Uuid::new_v4().to_string()).collect();
    for raw in &raws {
        repo.create(&token_row(user.id, raw)).await.unwrap();
    }

    let current = hash_token(&raws[1]);
    let revoked = repo.delete_all_except(user.id, &current).await.unwrap();
    assert_eq!(revoked, 2);

    assert!(repo.find_valid(&hash_token(&raws[0])).await.unwrap().is_none());
    assert!(repo.find_valid(&current).await.unwrap().is_some());
    assert!(repo.find_valid(&hash_token(&raws[2])).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_registration_insert_answers_email_taken() {
    let Some(pool) = try_pool().await else { return };
    let repo = UserRepository::new(pool.clone());
    let request = register_request();

    repo.create(&request, "$2b$12$test-only-hash", UserRole::Customer)
        .await
        .unwrap();

    // Same path a concurrent registration loser takes: the pre-insert
    // existence check passed, the constraint did not.
    let err = repo
        .create(&request, "$2b$12$test-only-hash", UserRole::Customer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmailTaken));
}

#[tokio::test]
async fn concurrent_lock_acquisition_has_one_winner() {
    let Some(pool) = try_pool().await else { return };
    let task = format!("test-lock-{}", Uuid::new_v4());

    let (a, b) = tokio::join!(
        acquire_lock(&pool, &task, "inst-a", 600, 3),
        acquire_lock(&pool, &task, "inst-b", 600, 3),
    );
    let wins = [a.unwrap(), b.unwrap()].into_iter().filter(|w| *w).count();
    assert_eq!(wins, 1);

    // A held lock stays exclusive until released.
    assert!(!acquire_lock(&pool, &task, "inst-c", 600, 3).await.unwrap());
    release_lock(&pool, &task).await.unwrap();
    assert!(acquire_lock(&pool, &task, "inst-c", 600, 3).await.unwrap());

    release_lock(&pool, &task).await.unwrap();
}

#[tokio::test]
async fn stale_lock_is_taken_over() {
    let Some(pool) = try_pool().await else { return };
    let task = format!("test-lock-{}", Uuid::new_v4());

    sqlx::query(
        "INSERT INTO cron_locks (task_name, instance_id, locked_at)
         VALUES ($1, $2, NOW() - INTERVAL '1 hour')",
    )
    .bind(&task)
    .bind("crashed-instance")
    .execute(&pool)
    .await
    .unwrap();

    assert!(is_lock_stale(&pool, &task, 600).await);
    assert!(acquire_lock(&pool, &task, "inst-b", 600, 3).await.unwrap());
    assert!(!is_lock_stale(&pool, &task, 600).await);

    release_lock(&pool, &task).await.unwrap();
}
