//! Registration, login, refresh and bearer authentication

use std::sync::Arc;

use crate::config::AdminBootstrap;
use crate::error::{Error, Result};
use crate::storage::Database;
use crate::types::{Token, TokenType, User, UserCreate, UserResponse, UserRole};

use super::password::{hash_password, verify_password};
use super::token::TokenService;

pub(crate) const INVALID_CREDENTIALS: &str = "Could not validate credentials";

/// Account and token operations
pub struct AuthService {
    db: Arc<Database>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(db: Arc<Database>, tokens: Arc<TokenService>) -> Self {
        Self { db, tokens }
    }

    /// Create a regular user account
    pub fn register(&self, payload: &UserCreate) -> Result<User> {
        payload.validate()?;

        if self.db.get_user_by_email(&payload.email)?.is_some() {
            return Err(Error::Conflict("Email already registered".to_string()));
        }
        if self.db.get_user_by_username(&payload.username)?.is_some() {
            return Err(Error::Conflict("Username already taken".to_string()));
        }

        let hash = hash_password(&payload.password)?;
        let user = self
            .db
            .create_user(&payload.email, &payload.username, &hash, UserRole::User)?;
        tracing::info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Exchange email and password for a token pair
    pub fn login(&self, email: &str, password: &str) -> Result<Token> {
        let user = self
            .db
            .get_user_by_email(email)?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| Error::Unauthorized("Incorrect email or password".to_string()))?;

        if !user.is_active {
            return Err(Error::Forbidden("User account is inactive".to_string()));
        }

        self.issue_tokens(&user)
    }

    /// Exchange a refresh token for a new token pair
    pub fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let invalid = || Error::Unauthorized("Invalid or expired refresh token".to_string());

        let claims = self
            .tokens
            .decode(refresh_token)
            .filter(|c| c.token_type == TokenType::Refresh)
            .ok_or_else(invalid)?;
        let user_id = claims.user_id().ok_or_else(invalid)?;

        let user = self
            .db
            .get_user_by_id(user_id)?
            .filter(|u| u.is_active)
            .ok_or_else(invalid)?;

        self.issue_tokens(&user)
    }

    /// Resolve an access token to an active user
    pub fn authenticate(&self, access_token: &str) -> Result<User> {
        let invalid = || Error::Unauthorized(INVALID_CREDENTIALS.to_string());

        let claims = self
            .tokens
            .decode(access_token)
            .filter(|c| c.token_type == TokenType::Access)
            .ok_or_else(invalid)?;
        let user_id = claims.user_id().ok_or_else(invalid)?;
        let user = self.db.get_user_by_id(user_id)?.ok_or_else(invalid)?;

        if !user.is_active {
            return Err(Error::Forbidden("User account is inactive".to_string()));
        }
        Ok(user)
    }

    /// Create the configured admin, or promote it if it already exists
    pub fn ensure_bootstrap_admin(&self, admin: &AdminBootstrap) -> Result<User> {
        if let Some(user) = self.db.get_user_by_email(&admin.email)? {
            if !user.is_admin() {
                self.db.set_user_role(user.id, UserRole::Admin)?;
                tracing::info!("Promoted {} to admin", admin.email);
            }
            return self
                .db
                .get_user_by_id(user.id)?
                .ok_or_else(|| Error::internal("Bootstrap admin vanished"));
        }

        UserCreate {
            email: admin.email.clone(),
            username: admin.username.clone(),
            password: admin.password.clone(),
        }
        .validate()?;

        let hash = hash_password(&admin.password)?;
        let user = self
            .db
            .create_user(&admin.email, &admin.username, &hash, UserRole::Admin)?;
        tracing::info!("Created bootstrap admin {}", admin.email);
        Ok(user)
    }

    fn issue_tokens(&self, user: &User) -> Result<Token> {
        Ok(Token {
            access_token: self.tokens.create_access_token(user)?,
            refresh_token: self.tokens.create_refresh_token(user)?,
            token_type: "bearer".to_string(),
            user: UserResponse::from(user),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn service() -> (AuthService, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let tokens = Arc::new(TokenService::new(&SecurityConfig::default()));
        (AuthService::new(Arc::clone(&db), tokens), db)
    }

    fn payload(email: &str, username: &str) -> UserCreate {
        UserCreate {
            email: email.to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let (auth, _) = service();
        auth.register(&payload("ada@example.org", "ada")).unwrap();

        let err = auth.register(&payload("ada@example.org", "other")).unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");

        let err = auth.register(&payload("new@example.org", "ada")).unwrap_err();
        assert_eq!(err.to_string(), "Username already taken");
    }

    #[test]
    fn test_concurrent_register_same_email() {
        let (auth, db) = service();

        let results: Vec<Result<User>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["racer-one", "racer-two"]
                .into_iter()
                .map(|username| {
                    let auth = &auth;
                    scope.spawn(move || auth.register(&payload("race@example.org", username)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(db.get_user_by_email("race@example.org").unwrap().is_some());
    }

    #[test]
    fn test_login_and_authenticate() {
        let (auth, _) = service();
        let user = auth.register(&payload("ada@example.org", "ada")).unwrap();

        assert!(matches!(
            auth.login("ada@example.org", "wrong-password"),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            auth.login("nobody@example.org", "password123"),
            Err(Error::Unauthorized(_))
        ));

        let token = auth.login("ada@example.org", "password123").unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(auth.authenticate(&token.access_token).unwrap().id, user.id);

        // A refresh token is not an access token
        assert!(matches!(
            auth.authenticate(&token.refresh_token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_refresh() {
        let (auth, _) = service();
        auth.register(&payload("ada@example.org", "ada")).unwrap();
        let token = auth.login("ada@example.org", "password123").unwrap();

        let renewed = auth.refresh(&token.refresh_token).unwrap();
        assert_eq!(renewed.user.email, "ada@example.org");

        let err = auth.refresh(&token.access_token).unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired refresh token");
    }

    #[test]
    fn test_bootstrap_admin_creates_then_promotes() {
        let (auth, db) = service();
        let admin = AdminBootstrap {
            email: "root@example.org".to_string(),
            username: "root".to_string(),
            password: "supersecret".to_string(),
        };

        let created = auth.ensure_bootstrap_admin(&admin).unwrap();
        assert!(created.is_admin());
        assert_eq!(auth.ensure_bootstrap_admin(&admin).unwrap().id, created.id);

        let user = auth.register(&payload("late@example.org", "late")).unwrap();
        db.set_user_role(user.id, UserRole::User).unwrap();
        let promoted = auth
            .ensure_bootstrap_admin(&AdminBootstrap {
                email: "late@example.org".to_string(),
                username: "late".to_string(),
                password: "ignored-password".to_string(),
            })
            .unwrap();
        assert!(promoted.is_admin());
    }
}
