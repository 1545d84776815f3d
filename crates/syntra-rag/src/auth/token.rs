//! HS256 JSON Web Tokens

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use ring::hmac;
use serde::Deserialize;

use crate::config::SecurityConfig;
use crate::error::Result;
use crate::types::{Claims, TokenType, User};

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Signs and verifies access/refresh tokens
pub struct TokenService {
    key: hmac::Key,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, config.secret_key.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
        }
    }

    /// Short-lived token for API calls
    pub fn create_access_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Access, self.access_ttl)
    }

    /// Long-lived token accepted only by `/auth/refresh`
    pub fn create_refresh_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Refresh, self.refresh_ttl)
    }

    fn issue(&self, user: &User, token_type: TokenType, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
        };
        self.encode(&claims)
    }

    /// Sign arbitrary claims
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        let header = URL_SAFE_NO_PAD.encode(HEADER.as_bytes());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{}.{}", header, payload);

        let signature = hmac::sign(&self.key, signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.as_ref())
        ))
    }

    /// Verify signature, algorithm and expiry
    pub fn decode(&self, token: &str) -> Option<Claims> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };

        let header_bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
        let parsed: Header = serde_json::from_slice(&header_bytes).ok()?;
        if parsed.alg != "HS256" {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        hmac::verify(&self.key, signing_input.as_bytes(), &signature).ok()?;

        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
        if claims.exp <= Utc::now().timestamp() {
            return None;
        }
        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    fn service(secret: &str) -> TokenService {
        TokenService::new(&SecurityConfig {
            secret_key: secret.to_string(),
            ..Default::default()
        })
    }

    fn user() -> User {
        User {
            id: 7,
            email: "ada@example.org".to_string(),
            username: "ada".to_string(),
            password_hash: String::new(),
            role: UserRole::Admin,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_roundtrip() {
        let tokens = service("a-secret-that-is-long-enough-for-tests");
        let token = tokens.create_access_token(&user()).unwrap();
        let claims = tokens.decode(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_refresh_token_type() {
        let tokens = service("a-secret-that-is-long-enough-for-tests");
        let token = tokens.create_refresh_token(&user()).unwrap();
        let claims = tokens.decode(&token).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let a = service("a-secret-that-is-long-enough-for-tests");
        let b = service("another-secret-that-is-long-enough-too");
        let token = a.create_access_token(&user()).unwrap();
        assert!(b.decode(&token).is_none());
    }

    #[test]
    fn test_rejects_expired() {
        let tokens = service("a-secret-that-is-long-enough-for-tests");
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "7".to_string(),
            email: "ada@example.org".to_string(),
            role: UserRole::User,
            iat: now - 120,
            exp: now - 60,
            token_type: TokenType::Access,
        };
        let token = tokens.encode(&claims).unwrap();
        assert!(tokens.decode(&token).is_none());
    }

    #[test]
    fn test_rejects_tampered_and_malformed() {
        let tokens = service("a-secret-that-is-long-enough-for-tests");
        let token = tokens.create_access_token(&user()).unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        parts[0] = &forged;
        assert!(tokens.decode(&parts.join(".")).is_none());

        assert!(tokens.decode("not-a-token").is_none());
        assert!(tokens.decode("a.b.c.d").is_none());
    }
}
