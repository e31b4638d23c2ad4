// LanceDB vector database module
// Holds the embedded chunks of one upload for similarity search

#[cfg(test)]
mod tests;

pub mod vector_store;

use chrono::Utc;
use uuid::Uuid;

use crate::ingest::DocumentChunk;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    pub vector: Vec<f32>,
    /// The chunk this embedding represents
    pub chunk: DocumentChunk,
    /// Position of the chunk within the upload
    pub chunk_index: u32,
    /// RFC 3339 timestamp of when the embedding was created
    pub created_at: String,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(chunk: DocumentChunk, chunk_index: u32, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            chunk,
            chunk_index,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Pair chunks with their embeddings, in upload order
#[inline]
pub fn records_from_embeddings(
    chunks: Vec<DocumentChunk>,
    embeddings: Vec<Vec<f32>>,
) -> Vec<EmbeddingRecord> {
    chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (chunk, vector))| {
            EmbeddingRecord::new(chunk, u32::try_from(i).unwrap_or(u32::MAX), vector)
        })
        .collect()
}
