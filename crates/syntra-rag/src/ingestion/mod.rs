//! PDF ingestion: validation, text extraction, metadata and chunking

pub mod chunker;
pub mod llm_metadata;
pub mod metadata;
pub mod pdf;
pub mod questions;
pub mod validate;

pub use chunker::{SmartChunker, TextChunker};
pub use metadata::{
    format_for_database, is_metadata_incomplete, merge_metadata, validate_metadata,
};
pub use pdf::{extract_pages, PageText, RawPdfText};
pub use questions::generate_questions;
pub use validate::{validate_pdf, validate_size};
