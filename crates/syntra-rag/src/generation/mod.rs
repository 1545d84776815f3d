//! LLM access and prompt templates

pub mod ollama;
pub mod prompt;

pub use ollama::{missing_models, OllamaClient};
pub use prompt::PromptBuilder;
