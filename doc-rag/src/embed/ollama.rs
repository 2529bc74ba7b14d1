//! Ollama embedding provider implementation.
//!
//! Calls `POST {base}/api/embeddings` once per text with a blocking
//! `reqwest` client. Run it from a plain thread or `spawn_blocking`, never
//! directly on an async worker.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EmbeddingConfig;
use crate::{Embedder, RagError};

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama embedding provider (blocking).
#[derive(Clone, Debug)]
pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    dim: usize,
}

impl OllamaEmbedder {
    /// Construct a new embedder from configuration.
    ///
    /// # Errors
    /// [`RagError::Embedding`] if the HTTP client cannot be built.
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self, RagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Embedding(format!("http client build: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/api/embeddings", cfg.ollama_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            dim: cfg.dim,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        trace!(target: "doc_rag::embed", model = %self.model, len = text.len(), "ollama embed");
        let req = OllamaEmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .map_err(|e| RagError::Embedding(format!("POST {}: {e}", self.url)))?;

        if resp.status() != StatusCode::OK {
            let code = resp.status();
            let body = resp
                .text()
                .unwrap_or_else(|_| "<failed to read body>".into());
            return Err(RagError::Embedding(format!(
                "ollama embeddings non-200: {code}; body: {body}"
            )));
        }

        let parsed: OllamaEmbedResponse = resp
            .json()
            .map_err(|e| RagError::Embedding(format!("parse embeddings json: {e}")))?;

        if parsed.embedding.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                got: parsed.embedding.len(),
                want: self.dim,
            });
        }
        Ok(parsed.embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        debug!(target: "doc_rag::embed", model = %self.model, total = texts.len(), "embedding documents");
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_one(text)
    }
}
