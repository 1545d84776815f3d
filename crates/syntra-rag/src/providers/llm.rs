//! LLM provider trait for text generation

use async_trait::async_trait;
use crate::error::Result;

/// Trait for prompt completion
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (gemma3, llama3, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a fully built prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
