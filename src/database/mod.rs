// Database module
// Session-scoped LanceDB store for chunk embeddings

pub mod lancedb;

pub use self::lancedb::{EmbeddingRecord, vector_store::{SearchResult, VectorStore}};
