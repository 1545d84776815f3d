//! Configuration for the journal backend
//!
//! Loaded from an optional TOML file, then overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Development secret shipped in the default config; startup warns when it is in use
pub const DEV_SECRET_KEY: &str = "syntra-dev-secret-key-change-me-in-production";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// SQLite settings
    pub database: DatabaseConfig,
    /// JWT and bootstrap admin settings
    pub security: SecurityConfig,
    /// Object storage (local filesystem or MinIO/S3)
    pub storage: StorageConfig,
    /// Ollama settings
    pub llm: LlmConfig,
    /// GROBID settings
    pub grobid: GrobidConfig,
    /// Word-window chunking
    pub chunking: ChunkingConfig,
    /// Background processing
    pub processing: ProcessingConfig,
    /// Upload limits
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file and apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read config {}: {}", path.display(), e))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    Error::Config(format!("Invalid config {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SECRET_KEY") {
            self.security.secret_key = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MINIO_ENDPOINT") {
            self.storage.endpoint = v;
            self.storage.backend = StorageBackend::S3;
        }
        if let Some(v) = lookup("MINIO_ACCESS_KEY") {
            self.storage.access_key = v;
        }
        if let Some(v) = lookup("MINIO_SECRET_KEY") {
            self.storage.secret_key = v;
        }
        if let Some(v) = lookup("MINIO_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("MINIO_SECURE") {
            self.storage.secure = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("GROBID_URL") {
            self.grobid.url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT: {}", v)))?;
        }
        Ok(())
    }

    /// Check invariants that cannot be expressed with serde
    pub fn validate(&self) -> Result<()> {
        if self.security.secret_key.len() < 32 {
            return Err(Error::Config(
                "security.secret_key must be at least 32 bytes".to_string(),
            ));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size".to_string(),
            ));
        }
        if self.processing.workers == 0 {
            return Err(Error::Config("processing.workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// True when the shipped development secret is still in use
    pub fn uses_dev_secret(&self) -> bool {
        self.security.secret_key == DEV_SECRET_KEY
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// SQLite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("syntra")
                .join("syntra.db"),
        }
    }
}

/// Admin account created at startup when configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrap {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HS256 signing key
    pub secret_key: String,
    /// Access token lifetime
    pub access_token_expire_minutes: i64,
    /// Refresh token lifetime
    pub refresh_token_expire_days: i64,
    /// Optional admin to create or promote at startup
    pub bootstrap_admin: Option<AdminBootstrap>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: DEV_SECRET_KEY.to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            bootstrap_admin: None,
        }
    }
}

/// Object storage backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files under `local_dir`
    #[default]
    Local,
    /// MinIO or any S3-compatible endpoint
    S3,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend
    pub local_dir: PathBuf,
    /// `host:port` of the S3 endpoint
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Use https
    pub secure: bool,
    pub bucket: String,
    /// Lifetime of presigned download URLs
    pub presign_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("syntra")
                .join("objects"),
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            secure: false,
            bucket: "documents".to_string(),
            presign_expiry_secs: 3600,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
    /// Expected embedding size
    pub embedding_dimensions: usize,
    /// Embedding input is cut to this many characters
    pub max_embed_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "gemma3:1b".to_string(),
            temperature: 0.3,
            timeout_secs: 60,
            max_retries: 2,
            embedding_dimensions: 768,
            max_embed_chars: 8000,
        }
    }
}

/// GROBID configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrobidConfig {
    pub url: String,
    pub header_timeout_secs: u64,
    pub fulltext_timeout_secs: u64,
}

impl Default for GrobidConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8070".to_string(),
            header_timeout_secs: 60,
            fulltext_timeout_secs: 120,
        }
    }
}

/// Text chunking configuration (sizes are in words)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Used to estimate page numbers when no page text matches
    pub words_per_page: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            words_per_page: 500,
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Concurrent documents
    pub workers: usize,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Hard limit for one pipeline run
    pub task_timeout_secs: u64,
    /// Generate hypothetical questions per chunk
    pub generate_questions: bool,
    pub questions_per_chunk: usize,
    /// Seconds finished job progress stays queryable
    pub progress_retention_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 2,
            retry_delay_secs: 30,
            task_timeout_secs: 600,
            generate_questions: true,
            questions_per_chunk: 5,
            progress_retention_secs: 3600,
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum PDF size in bytes
    pub max_pdf_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_pdf_size: 50 * 1024 * 1024,
        }
    }
}

impl UploadConfig {
    /// Limit in whole megabytes, for error messages
    pub fn max_mb(&self) -> usize {
        self.max_pdf_size / (1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.uses_dev_secret());
        assert_eq!(config.llm.generate_model, "gemma3:1b");
        assert_eq!(config.upload.max_mb(), 50);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MINIO_ENDPOINT", "minio:9000"),
            ("MINIO_SECURE", "true"),
            ("OLLAMA_BASE_URL", "http://ollama:11434/"),
            ("PORT", "9001"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.endpoint, "minio:9000");
        assert!(config.storage.secure);
        assert_eq!(config.llm.base_url, "http://ollama:11434");
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| (k == "PORT").then(|| "abc".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = AppConfig::default();
        config.security.secret_key = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 8123

            [processing]
            workers = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.processing.workers, 4);
        assert_eq!(config.processing.task_timeout_secs, 600);
    }
}
