pub mod types;
pub mod chunker;
pub mod embedder;
pub mod tagger;
pub mod vectordb;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    EmbeddingCount { chunks: usize, embeddings: usize },

    #[error("Chunks of document {document_id} carry different jurisdiction sets")]
    InconsistentTags { document_id: String },

    #[error("Chunking produced no results")]
    EmptyChunks,
}
