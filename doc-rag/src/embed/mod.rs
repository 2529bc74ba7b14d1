//! Embedding abstraction and the backends shipped with the crate.
//!
//! The retrieval core only relies on [`Embedder`]: order-preserving batch and
//! query calls, a constant output dimension, and a name that is recorded with
//! every index built from its vectors.

use std::sync::Arc;

use crate::config::{EmbedderKind, EmbeddingConfig};
use crate::errors::RagError;

pub mod hashing;
pub mod ollama;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

/// Maps text to fixed-length vectors.
///
/// Implement this trait to plug in your own embedding backend.
pub trait Embedder: Send + Sync {
    /// Identifier persisted alongside an index (usually the model name).
    fn name(&self) -> &str;

    /// Embeds a batch of documents; output order matches input order.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embeds a single query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Constructs the embedder selected by configuration.
pub fn from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, RagError> {
    Ok(match cfg.kind {
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(cfg)?),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(cfg.dim)),
    })
}
