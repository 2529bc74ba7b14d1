//! Runtime configuration resolved once at startup.
//!
//! Every component receives the pieces it needs by reference; nothing reads the
//! environment after [`AppConfig::from_env`] has returned.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RagError;
use crate::record::SearchQuery;

/// Default separators tried from coarsest to finest granularity.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// HTTP calls to an Ollama server.
    Ollama,
    /// Deterministic feature-hashing embedder (offline, tests).
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(EmbedderKind::Ollama),
            "hashing" | "hash" => Ok(EmbedderKind::Hashing),
            _ => Err(()),
        }
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of the same page.
    pub chunk_overlap: usize,
    /// Split separators, coarsest first. `""` means "cut anywhere".
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkingConfig {
    /// Validates size/overlap/separator combination.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(RagError::Config("at least one separator is required".into()));
        }
        Ok(())
    }
}

/// Embedding backend configuration (model, dimension, endpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub kind: EmbedderKind,
    /// Embedding model identifier (e.g., "bge-m3").
    pub model: String,
    /// Expected vector dimensionality.
    pub dim: usize,
    /// Ollama base URL.
    pub ollama_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Ollama,
            model: "bge-m3".to_string(),
            dim: 1024,
            ollama_url: "http://localhost:11434".to_string(),
        }
    }
}

/// Retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of nearest neighbours to return.
    pub top_k: usize,
    /// Maximum accepted distance; `None` disables filtering.
    pub score_threshold: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: None,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the persisted data (`<root>/domains/<domain>/vectorstore`).
    pub data_root: PathBuf,
    /// Valid domain names, lower-case, in declaration order.
    pub domains: Vec<String>,
    /// Domains that may fall back to Wikipedia lookups.
    pub wikipedia_domains: Vec<String>,
    /// Domain active at startup.
    pub default_domain: String,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    /// Worker count for batch ingestion.
    pub ingest_workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("app/data"),
            domains: vec!["hr".into(), "finance".into(), "it".into()],
            wikipedia_domains: Vec::new(),
            default_domain: "hr".into(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            ingest_workers: 4,
        }
    }
}

impl AppConfig {
    /// Build configuration from process environment variables.
    ///
    /// Environment variables used:
    /// - `DOCQA_DATA_DIR` (default: "app/data")
    /// - `DOCQA_DOMAINS` (comma separated; default: "hr,finance,it")
    /// - `DOCQA_WIKIPEDIA_DOMAINS` (comma separated; default: none)
    /// - `DOCQA_DOMAIN` (default: first entry of `DOCQA_DOMAINS`)
    /// - `CHUNK_SIZE` (default: 500)
    /// - `CHUNK_OVERLAP` (default: 100)
    /// - `RAG_TOP_K` (default: 3)
    /// - `RAG_SCORE_THRESHOLD` (optional)
    /// - `EMBEDDER` ("ollama" | "hashing"; default: "ollama")
    /// - `EMBEDDING_MODEL` (default: "bge-m3")
    /// - `EMBEDDING_DIM` (default: 1024)
    /// - `OLLAMA_URL` (default: "http://localhost:11434")
    /// - `INGEST_WORKERS` (default: 4)
    pub fn from_env() -> Result<Self, RagError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dflt = AppConfig::default();

        let domains = lookup("DOCQA_DOMAINS")
            .map(|v| split_list(&v))
            .unwrap_or(dflt.domains);
        let wikipedia_domains = lookup("DOCQA_WIKIPEDIA_DOMAINS")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        let default_domain = lookup("DOCQA_DOMAIN")
            .map(|v| v.trim().to_lowercase())
            .or_else(|| domains.first().cloned())
            .unwrap_or_default();

        let chunking = ChunkingConfig {
            chunk_size: read_env(&lookup, "CHUNK_SIZE")?.unwrap_or(dflt.chunking.chunk_size),
            chunk_overlap: read_env(&lookup, "CHUNK_OVERLAP")?
                .unwrap_or(dflt.chunking.chunk_overlap),
            separators: dflt.chunking.separators,
        };

        let kind = match lookup("EMBEDDER") {
            Some(v) => v.parse::<EmbedderKind>().map_err(|_| RagError::EnvParse {
                key: "EMBEDDER".into(),
                value: v,
            })?,
            None => dflt.embedding.kind,
        };
        let embedding = EmbeddingConfig {
            kind,
            model: lookup("EMBEDDING_MODEL").unwrap_or(dflt.embedding.model),
            dim: read_env(&lookup, "EMBEDDING_DIM")?.unwrap_or(dflt.embedding.dim),
            ollama_url: lookup("OLLAMA_URL").unwrap_or(dflt.embedding.ollama_url),
        };

        let search = SearchConfig {
            top_k: read_env(&lookup, "RAG_TOP_K")?.unwrap_or(dflt.search.top_k),
            score_threshold: read_env(&lookup, "RAG_SCORE_THRESHOLD")?,
        };

        let cfg = Self {
            data_root: lookup("DOCQA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(dflt.data_root),
            domains,
            wikipedia_domains,
            default_domain,
            chunking,
            embedding,
            search,
            ingest_workers: read_env(&lookup, "INGEST_WORKERS")?.unwrap_or(dflt.ingest_workers),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.domains.is_empty() {
            return Err(RagError::Config("at least one domain is required".into()));
        }
        if !self.domains.contains(&self.default_domain) {
            return Err(RagError::unknown_domain(&self.default_domain, &self.domains));
        }
        if let Some(d) = self
            .wikipedia_domains
            .iter()
            .find(|d| !self.domains.contains(d))
        {
            return Err(RagError::unknown_domain(d.as_str(), &self.domains));
        }
        self.chunking.validate()?;
        if self.embedding.dim == 0 {
            return Err(RagError::Config("EMBEDDING_DIM must be > 0".into()));
        }
        if self.search.top_k == 0 {
            return Err(RagError::Config("RAG_TOP_K must be > 0".into()));
        }
        if let Some(t) = self.search.score_threshold {
            SearchQuery::new("")
                .with_threshold(Some(t))
                .validate()
                .map_err(|_| {
                    RagError::Config(format!(
                        "RAG_SCORE_THRESHOLD must be a non-negative number, got {t}"
                    ))
                })?;
        }
        if self.ingest_workers == 0 {
            return Err(RagError::Config("INGEST_WORKERS must be > 0".into()));
        }
        Ok(())
    }
}

/// Read an optional value; a present but malformed value is an error.
fn read_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>, RagError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RagError::EnvParse {
                key: key.into(),
                value: v,
            }),
        None => Ok(None),
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
