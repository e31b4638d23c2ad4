// Embeddings module
// Text splitting ahead of embedding; the embedding calls live in `crate::openai`

pub mod chunking;

pub use chunking::{ChunkingConfig, TextSplitter, estimate_token_count};
