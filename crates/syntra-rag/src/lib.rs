//! syntra-rag: scientific journal storage with a RAG chat backend
//!
//! PDFs are stored in object storage, described with Dublin Core metadata
//! extracted by GROBID (with an LLM fallback), split into chunks and embedded
//! through Ollama. Chat answers are generated over the most similar chunks
//! and keep references to the passages they were grounded in.

pub mod auth;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod services;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::{build_router, state::AppState, AppServer};
