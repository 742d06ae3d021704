use chrono::Utc;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::user::{RegisterRequest, User, UserRole};

/// SQLSTATE 23505. The pre-insert existence check races with concurrent
/// registrations; the database constraint is the authority.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

const USER_COLUMNS: &str =
    "id, email, password_hash, name, phone, role, is_active, created_at, updated_at";

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            role: row.try_get("role")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Emails are stored lowercased; uniqueness is case-insensitive.
    pub async fn create(
        &self,
        request: &RegisterRequest,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        let row = query(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, phone, role)
            VALUES (LOWER($1), $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&request.email)
        .bind(password_hash)
        .bind(&request.name)
        .bind(&request.phone)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::EmailTaken
            } else {
                AppError::Database(err)
            }
        })?;

        Self::row_to_user(&row)
    }

    /// Only active accounts are eligible for login.
    pub async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1) AND is_active = TRUE"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let row = query("SELECT EXISTS(SELECT 1 FROM users WHERE email = LOWER($1)) as exists")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<bool, _>("exists").unwrap_or(false))
    }

    /// Auth flows never delete users; accounts are soft-deactivated.
    pub async fn deactivate(&self, user_id: Uuid) -> Result<bool> {
        let result = query("UPDATE users SET is_active = FALSE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
