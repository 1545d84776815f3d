//! Similarity search over stored chunk vectors

mod search;

pub use search::{cosine_similarity, decode_vector, encode_vector, rank_chunks, ScoredChunk};
