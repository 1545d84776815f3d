//! Shared application state

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::auth::{AuthService, TokenService};
use crate::config::{AppConfig, StorageBackend};
use crate::error::Result;
use crate::processing::{Job, JobQueue};
use crate::providers::{
    EmbeddingProvider, GrobidClient, LlmProvider, LocalObjectStore, ObjectStore, OllamaProvider,
    S3ObjectStore,
};
use crate::services::ChatService;
use crate::storage::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// SQLite database
    db: Arc<Database>,
    /// PDF storage (local directory or MinIO/S3)
    store: Arc<dyn ObjectStore>,
    /// Embedding provider
    embedder: Arc<dyn EmbeddingProvider>,
    /// LLM provider
    llm: Arc<dyn LlmProvider>,
    /// GROBID client for metadata and structure
    grobid: Arc<GrobidClient>,
    /// Job queue for async processing
    job_queue: Arc<JobQueue>,
    tokens: Arc<TokenService>,
    auth: AuthService,
    chat: ChatService,
}

impl AppState {
    /// Create state with production providers
    ///
    /// The returned receiver feeds the document worker.
    pub fn new(config: AppConfig) -> Result<(Self, mpsc::Receiver<Job>)> {
        tracing::info!("Initializing application state...");

        if let Some(parent) = config.database.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::new(&config.database.path)?;
        tracing::info!("Database opened at {}", config.database.path.display());

        let store: Arc<dyn ObjectStore> = match config.storage.backend {
            StorageBackend::Local => {
                tracing::info!(
                    "Using local object storage at {}",
                    config.storage.local_dir.display()
                );
                Arc::new(LocalObjectStore::new(config.storage.local_dir.clone())?)
            }
            StorageBackend::S3 => {
                tracing::info!(
                    "Using S3 object storage at {} (bucket: {})",
                    config.storage.endpoint,
                    config.storage.bucket
                );
                Arc::new(S3ObjectStore::new(&config.storage)?)
            }
        };

        let (embedder, llm) = OllamaProvider::new(&config.llm)?.split();
        tracing::info!(
            "Ollama providers initialized (embed: {}, generate: {})",
            config.llm.embed_model,
            config.llm.generate_model
        );

        Self::with_providers(config, db, store, Arc::new(embedder), Arc::new(llm))
    }

    /// Create state around the given database and providers
    pub fn with_providers(
        config: AppConfig,
        db: Database,
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<(Self, mpsc::Receiver<Job>)> {
        let db = Arc::new(db);
        let grobid = Arc::new(GrobidClient::new(&config.grobid)?);
        let tokens = Arc::new(TokenService::new(&config.security));
        let auth = AuthService::new(Arc::clone(&db), Arc::clone(&tokens));
        let chat = ChatService::new(Arc::clone(&db), Arc::clone(&embedder), Arc::clone(&llm));

        let (job_queue, receiver) = JobQueue::new(config.processing.workers.max(1));
        let job_queue = job_queue.with_retention(Duration::from_secs(
            config.processing.progress_retention_secs,
        ));
        tracing::info!(
            "Job queue initialized with {} workers",
            config.processing.workers.max(1)
        );

        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                store,
                embedder,
                llm,
                grobid,
                job_queue: Arc::new(job_queue),
                tokens,
                auth,
                chat,
            }),
        };

        Ok((state, receiver))
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.inner.db
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm
    }

    pub fn grobid(&self) -> &Arc<GrobidClient> {
        &self.inner.grobid
    }

    /// Get job queue
    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.inner.tokens
    }

    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    pub fn chat(&self) -> &ChatService {
        &self.inner.chat
    }
}
