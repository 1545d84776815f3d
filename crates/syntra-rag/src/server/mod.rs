//! HTTP server for the journal backend

pub mod routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::processing::{DocumentWorker, Job};
use state::AppState;

/// Journal HTTP server
pub struct AppServer {
    config: AppConfig,
    state: AppState,
}

impl AppServer {
    /// Create the server with production providers and start background work
    pub async fn new(config: AppConfig) -> Result<Self> {
        let (state, receiver) = AppState::new(config.clone())?;
        Self::from_state(state, receiver).await
    }

    /// Wrap existing state: ensure the bucket, bootstrap the admin, spawn
    /// the worker and requeue unfinished documents
    pub async fn from_state(state: AppState, receiver: mpsc::Receiver<Job>) -> Result<Self> {
        let config = state.config().clone();

        if let Err(e) = state.store().ensure_bucket().await {
            tracing::warn!("Object storage not ready ({}): {}", state.store().name(), e);
        }

        if let Some(admin) = config.security.bootstrap_admin.as_ref() {
            state.auth().ensure_bootstrap_admin(admin)?;
        }

        let worker = DocumentWorker::new(state.clone());
        tokio::spawn(async move {
            worker.run(receiver).await;
        });

        DocumentWorker::resume_incomplete(&state).await?;

        Ok(Self { config, state })
    }

    /// Shared state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.router();

        tracing::info!("Starting server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        self.config.server.address()
    }
}

/// Router over the given state, with middleware
pub fn build_router(state: AppState) -> Router {
    let config = state.config().clone();

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(routes::api_routes(config.upload.max_pdf_size))
        .with_state(state)
        // Middleware layers (applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if config.server.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Liveness endpoint
async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "API is running",
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = if state.db().ping() {
        "connected"
    } else {
        "disconnected"
    };

    Json(json!({
        "status": "healthy",
        "database": database,
        "queue": state.job_queue().stats(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
