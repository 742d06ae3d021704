use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Cook,
    Waiter,
    Cashier,
    Driver,
    Customer,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Owner | UserRole::Admin)
    }

    /// Any non-customer role; gates the staff-only surface (order status
    /// updates, cash sessions, reservation management).
    pub fn is_staff(&self) -> bool {
        !matches!(self, UserRole::Customer)
    }

    pub fn can_manage_orders(&self) -> bool {
        matches!(
            self,
            UserRole::Owner | UserRole::Admin | UserRole::Cook | UserRole::Waiter | UserRole::Cashier
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Admin => "admin",
            UserRole::Cook => "cook",
            UserRole::Waiter => "waiter",
            UserRole::Cashier => "cashier",
            UserRole::Driver => "driver",
            UserRole::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(length(max = 20, message = "Phone number too long"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_predicates() {
        assert!(UserRole::Owner.is_admin());
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::Waiter.is_admin());

        assert!(UserRole::Cook.is_staff());
        assert!(!UserRole::Customer.is_staff());

        assert!(UserRole::Cashier.can_manage_orders());
        assert!(!UserRole::Driver.can_manage_orders());
    }

    #[test]
    fn role_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Waiter).unwrap(), "\"waiter\"");
        let role: UserRole = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, UserRole::Owner);
    }

    #[test]
    fn register_request_validation() {
        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            name: "x".to_string(),
            phone: None,
        };
        assert!(bad.validate().is_err());

        let good = RegisterRequest {
            email: "a@b.com".to_string(),
            password: "Password1!".to_string(),
            name: "Ada".to_string(),
            phone: Some("+31612345678".to_string()),
        };
        assert!(good.validate().is_ok());
    }
}
