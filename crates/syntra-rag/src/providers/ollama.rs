//! Ollama-based providers for embeddings and LLM
//!
//! Wraps the OllamaClient to implement the provider traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::generation::OllamaClient;

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
    max_chars: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(Arc::new(OllamaClient::new(config)?)))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>) -> Self {
        let dimensions = client.config().embedding_dimensions;
        let max_chars = client.config().max_embed_chars;
        Self {
            client,
            dimensions,
            max_chars,
        }
    }
}

/// Trim and cut `text` to at most `max_chars` characters; `None` when blank
pub(crate) fn prepare_embedding_input(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        match prepare_embedding_input(text, self.max_chars) {
            Some(input) => self.client.embed(&input).await.map(Some),
            None => Ok(None),
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for answers, metadata and questions
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(Arc::new(OllamaClient::new(config)?)))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>) -> Self {
        let model = client.config().generate_model.clone();
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client.generate(prompt).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Combined Ollama provider that shares a single client for both embeddings and LLM
pub struct OllamaProvider {
    embedder: OllamaEmbedder,
    llm: OllamaLlm,
}

impl OllamaProvider {
    /// Create a new combined Ollama provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(config)?);
        Ok(Self {
            embedder: OllamaEmbedder::from_client(Arc::clone(&client)),
            llm: OllamaLlm::from_client(client),
        })
    }

    /// Split into separate providers
    pub fn split(self) -> (OllamaEmbedder, OllamaLlm) {
        (self.embedder, self.llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_is_skipped() {
        assert_eq!(prepare_embedding_input("   \n\t", 10), None);
    }

    #[test]
    fn test_input_is_trimmed_and_truncated() {
        assert_eq!(
            prepare_embedding_input("  abcdefgh  ", 5).as_deref(),
            Some("abcde")
        );
        // Multi-byte characters count as one
        assert_eq!(prepare_embedding_input("ééé", 2).as_deref(), Some("éé"));
    }

    #[test]
    fn test_provider_reports_config() {
        let config = LlmConfig::default();
        let (embedder, llm) = OllamaProvider::new(&config).unwrap().split();
        assert_eq!(embedder.dimensions(), config.embedding_dimensions);
        assert_eq!(llm.model(), config.generate_model);
    }
}
