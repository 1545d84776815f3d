//! Error types for the journal backend

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the GROBID service
#[derive(Debug, Error)]
pub enum GrobidError {
    /// Service could not be reached
    #[error("GROBID service is not available. Please ensure GROBID is running.")]
    Unavailable,

    /// Request exceeded its timeout
    #[error("GROBID request timed out. The PDF may be too large.")]
    Timeout,

    /// Non-success status from the service
    #[error("GROBID {endpoint} failed with status {status}")]
    Status { endpoint: String, status: u16 },

    /// TEI response could not be parsed
    #[error("Failed to parse GROBID XML response: {0}")]
    Xml(String),
}

/// Backend errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request data
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Entity not found
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate email, username, ...)
    #[error("{0}")]
    Conflict(String),

    /// Upload exceeded the configured limit
    #[error("File too large. Maximum size: {max_mb}MB")]
    PayloadTooLarge { max_mb: usize },

    /// GROBID extraction error
    #[error(transparent)]
    Grobid(#[from] GrobidError),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ollama/LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable kind, also used for `processing_error`
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Validation(_) => "ValidationError",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::PayloadTooLarge { .. } => "PayloadTooLarge",
            Error::Grobid(_) => "GrobidError",
            Error::Storage(_) => "StorageError",
            Error::Llm(_) => "LlmError",
            Error::Embedding(_) => "EmbeddingError",
            Error::Database(_) => "DatabaseError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Http(_) => "HttpError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::Conflict(_)
            | Error::PayloadTooLarge { .. }
            | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Grobid(GrobidError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Grobid(GrobidError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Error::Llm(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Grobid(_)
            | Error::Config(_)
            | Error::Storage(_)
            | Error::Embedding(_)
            | Error::Database(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't leak SQL or IO details to clients
        let detail = match &self {
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal database error".to_string()
            }
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal IO error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "detail": detail,
            "error_type": self.kind(),
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Conflict("Email already registered".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Grobid(GrobidError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Grobid(GrobidError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_unauthorized_sets_www_authenticate() {
        let response = Error::Unauthorized("Could not validate credentials".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_payload_message() {
        let err = Error::PayloadTooLarge { max_mb: 50 };
        assert_eq!(err.to_string(), "File too large. Maximum size: 50MB");
    }
}
