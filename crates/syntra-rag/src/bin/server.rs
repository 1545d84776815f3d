//! Syntra server binary
//!
//! Run with: cargo run -p syntra-rag --bin syntra-server -- --config syntra.toml

use clap::Parser;
use std::path::PathBuf;
use syntra_rag::{
    config::AppConfig,
    generation::{missing_models, OllamaClient},
    providers::GrobidClient,
    server::AppServer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Journal storage and RAG chat backend
#[derive(Debug, Parser)]
#[command(name = "syntra-server", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SYNTRA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syntra_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                        Syntra RAG                         ║
║        Journal Storage and Chat with Cited Sources        ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.database.path.display());
    tracing::info!("  - Storage backend: {:?}", config.storage.backend);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!("  - Chunk size: {} words", config.chunking.chunk_size);
    if config.uses_dev_secret() {
        tracing::warn!("Using the built-in development SECRET_KEY; set SECRET_KEY in production");
    }

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    let ollama = OllamaClient::new(&config.llm)?;
    match ollama.health_check().await {
        Ok(true) => {
            tracing::info!("Ollama is running");
            match ollama.list_models().await {
                Ok(models) => {
                    tracing::info!("  - Models available: {}", models.len());
                    let wanted = [
                        config.llm.embed_model.as_str(),
                        config.llm.generate_model.as_str(),
                    ];
                    for model in missing_models(&models, &wanted) {
                        tracing::warn!("Model {} not pulled: ollama pull {}", model, model);
                    }
                }
                Err(e) => tracing::warn!("Could not list Ollama models: {}", e),
            }
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!(
                "  Pull models: ollama pull {} && ollama pull {}",
                config.llm.embed_model,
                config.llm.generate_model
            );
        }
    }

    // Check GROBID
    tracing::info!("Checking GROBID at {}...", config.grobid.url);
    let grobid = GrobidClient::new(&config.grobid)?;
    match grobid.health_check().await {
        Ok(true) => tracing::info!("GROBID is running"),
        _ => tracing::warn!(
            "GROBID not available at {}; uploads will fail until it is up",
            config.grobid.url
        ),
    }

    // Create and start server
    let server = AppServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /auth/login        - Obtain tokens");
    println!("  POST /documents/upload  - Upload a PDF (admin)");
    println!("  GET  /documents         - List documents");
    println!("  POST /chats             - Ask a question");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
