pub mod types;
pub mod decompose;
pub mod retrieval;
pub mod prompt;
pub mod citation;
pub mod parser;
pub mod synthesis;
pub mod aggregate;
pub mod ollama;
pub mod orchestrator;

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Ollama connection failed: {0}")]
    OllamaConnection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("Query decomposition failed: {0}")]
    Decomposition(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
