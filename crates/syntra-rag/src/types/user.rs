//! User accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Account role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

/// A stored user
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl UserCreate {
    /// Check email shape and field lengths
    pub fn validate(&self) -> Result<()> {
        if !is_valid_email(&self.email) {
            return Err(Error::validation("value is not a valid email address"));
        }
        let username_len = self.username.chars().count();
        if !(3..=100).contains(&username_len) {
            return Err(Error::validation(
                "username must be between 3 and 100 characters",
            ));
        }
        let password_len = self.password.chars().count();
        if !(8..=100).contains(&password_len) {
            return Err(Error::validation(
                "password must be between 8 and 100 characters",
            ));
        }
        Ok(())
    }
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

/// User as returned by the API (no password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(email: &str, username: &str, password: &str) -> UserCreate {
        UserCreate {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_good_input() {
        assert!(payload("ada@example.org", "ada", "correct horse").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(payload("not-an-email", "ada", "password1").validate().is_err());
        assert!(payload("ada@localhost", "ada", "password1").validate().is_err());
        assert!(payload("ada@example.org", "ad", "password1").validate().is_err());
        assert!(payload("ada@example.org", "ada", "short").validate().is_err());
    }
}
