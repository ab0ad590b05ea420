use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::LlmGenerate;
use super::RagError;
use crate::config::EngineConfig;
use crate::pipeline::storage::types::EmbeddingModel;
use crate::pipeline::storage::StorageError;

/// Ollama HTTP client serving as both generator and embedding model.
///
/// The blocking HTTP client is built per call, so the pipeline only ever
/// touches it from worker threads and never from an async context.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    embedding_model: String,
    embedding_dim: usize,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: &str,
        embedding_model: &str,
        embedding_dim: usize,
        timeout_secs: u64,
    ) -> Result<Self, RagError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RagError::HttpClient(format!(
                "Ollama URL must be http(s): {base_url:?}"
            )));
        }
        if model.trim().is_empty() || embedding_model.trim().is_empty() {
            return Err(RagError::HttpClient("Model names must not be empty".into()));
        }

        Ok(Self {
            base_url: base_url.to_string(),
            model: model.trim().to_string(),
            embedding_model: embedding_model.trim().to_string(),
            embedding_dim,
            timeout_secs: timeout_secs.max(1),
        })
    }

    /// Client for the instance and models named in the engine config.
    pub fn from_config(config: &EngineConfig) -> Result<Self, RagError> {
        Self::new(
            &config.ollama_url,
            &config.generation_model,
            &config.embedding_model,
            config.embedding_dim,
            config.generation_timeout.as_secs(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http(&self) -> Result<reqwest::blocking::Client, RagError> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| RagError::HttpClient(e.to_string()))
    }

    fn send_error(&self, e: reqwest::Error) -> RagError {
        if e.is_connect() {
            RagError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            RagError::Timeout(Duration::from_secs(self.timeout_secs))
        } else {
            RagError::HttpClient(e.to_string())
        }
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RagError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http()?
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "Ollama returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))
    }

    /// Names of the models installed on the instance.
    pub fn list_models(&self) -> Result<Vec<String>, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http()?
            .get(&url)
            .send()
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "Ollama returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, RagError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Deterministic sampling so repeated questions get repeated verdicts.
#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl LlmGenerate for OllamaClient {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, RagError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };
        let parsed: GenerateResponse = self.post("/api/generate", &body)?;
        Ok(parsed.response)
    }
}

impl EmbeddingModel for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let parsed: EmbeddingResponse = self
            .post("/api/embeddings", &body)
            .map_err(|e| StorageError::Embedding(e.to_string()))?;

        if parsed.embedding.len() != self.embedding_dim {
            return Err(StorageError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.embedding_dim
    }
}
