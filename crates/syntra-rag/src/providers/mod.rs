//! Provider abstractions for embeddings, LLM, object storage and GROBID
//!
//! The embedding, LLM and object-store traits let the server run against
//! Ollama and MinIO in production and against in-process stubs in tests.

pub mod embedding;
pub mod grobid;
pub mod llm;
pub mod local;
pub mod object_store;
pub mod ollama;
pub mod s3;

pub use embedding::EmbeddingProvider;
pub use grobid::{FulltextResult, GrobidClient, HeaderMetadata, Section};
pub use llm::LlmProvider;
pub use local::LocalObjectStore;
pub use object_store::ObjectStore;
pub use ollama::{OllamaEmbedder, OllamaLlm, OllamaProvider};
pub use s3::S3ObjectStore;
