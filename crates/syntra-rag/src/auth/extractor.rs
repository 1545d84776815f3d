//! Bearer-token extractor for handlers

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::User;

use super::service::INVALID_CREDENTIALS;

/// The authenticated, active user behind the request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn user(&self) -> &User {
        &self.0
    }

    /// 403 unless the user is an admin
    pub fn require_admin(&self) -> Result<&User> {
        if self.0.is_admin() {
            Ok(&self.0)
        } else {
            Err(Error::Forbidden("Admin privileges required".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| Error::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        state.auth().authenticate(token).map(CurrentUser)
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer xyz"), Some("xyz"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
