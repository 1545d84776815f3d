//! Document chunks with embeddings and hypothetical questions

use serde::{Deserialize, Serialize};

/// Kind of chunk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Title,
    Abstract,
    #[default]
    Paragraph,
    Table,
    Reference,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Title => "title",
            ChunkType::Abstract => "abstract",
            ChunkType::Paragraph => "paragraph",
            ChunkType::Table => "table",
            ChunkType::Reference => "reference",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "title" => ChunkType::Title,
            "abstract" => ChunkType::Abstract,
            "table" => ChunkType::Table,
            "reference" => ChunkType::Reference,
            _ => ChunkType::Paragraph,
        }
    }
}

/// A chunk ready to be stored
#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    /// Word count
    pub token_count: i64,
    pub embedding: Option<Vec<f32>>,
    pub possibly_questions: Option<Vec<String>>,
    pub possibly_question_embedding: Option<Vec<f32>>,
    pub chunk_metadata: serde_json::Value,
    pub page_number: Option<i64>,
    pub section_title: Option<String>,
    pub chunk_type: ChunkType,
}

/// A stored chunk
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    pub embedding: Option<Vec<f32>>,
    pub possibly_questions: Option<Vec<String>>,
    pub possibly_question_embedding: Option<Vec<f32>>,
    pub chunk_metadata: serde_json::Value,
    pub page_number: Option<i64>,
    pub section_title: Option<String>,
    pub chunk_type: ChunkType,
}

/// Vectors loaded for similarity ranking
#[derive(Debug, Clone)]
pub struct ChunkVectors {
    pub chunk_id: i64,
    pub document_id: i64,
    pub embedding: Option<Vec<f32>>,
    pub question_embedding: Option<Vec<f32>>,
}
