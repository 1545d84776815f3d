//! Brute-force cosine ranking over content and question embeddings

use crate::types::ChunkVectors;

/// A chunk id with its best similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub document_id: i64,
    /// Cosine similarity, higher is better
    pub similarity: f32,
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank chunks by the better of content and question similarity
///
/// Chunks without any vector are skipped.
pub fn rank_chunks(query: &[f32], vectors: &[ChunkVectors], top_k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = vectors
        .iter()
        .filter_map(|v| {
            let content = v.embedding.as_deref().map(|e| cosine_similarity(query, e));
            let question = v
                .question_embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e));

            let similarity = match (content, question) {
                (Some(c), Some(q)) => c.max(q),
                (Some(c), None) => c,
                (None, Some(q)) => q,
                (None, None) => return None,
            };

            Some(ScoredChunk {
                chunk_id: v.chunk_id,
                document_id: v.document_id,
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(top_k);
    scored
}

/// Little-endian f32 BLOB
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_vector`]; trailing partial values are ignored
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(id: i64, content: Option<Vec<f32>>, question: Option<Vec<f32>>) -> ChunkVectors {
        ChunkVectors {
            chunk_id: id,
            document_id: 1,
            embedding: content,
            question_embedding: question,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_rank_uses_best_signal() {
        let query = [1.0, 0.0];
        let all = vec![
            vectors(1, Some(vec![0.0, 1.0]), Some(vec![1.0, 0.0])),
            vectors(2, Some(vec![1.0, 1.0]), None),
            vectors(3, None, None),
        ];

        let ranked = rank_chunks(&query, &all, 5);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk_id, 1);
        assert!((ranked[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(ranked[1].chunk_id, 2);
    }

    #[test]
    fn test_rank_truncates() {
        let query = [1.0, 0.0];
        let all: Vec<_> = (0..10)
            .map(|i| vectors(i, Some(vec![1.0, i as f32]), None))
            .collect();
        let ranked = rank_chunks(&query, &all, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].chunk_id, 0);
    }

    #[test]
    fn test_vector_blob() {
        let v = vec![0.5f32, -1.25, 3.0];
        let blob = encode_vector(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_vector(&blob), v);
    }
}
