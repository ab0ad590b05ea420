use serde::{Deserialize, Serialize};

use super::StorageError;

/// A chunk of a policy document before jurisdiction tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub chunk_index: usize,
}

/// Chunking strategy trait
pub trait Chunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

/// Embedding model abstraction (the external `embed(text) -> vector`).
///
/// Must be deterministic for identical input within a session.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

/// Counters reported by a passage store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
}
