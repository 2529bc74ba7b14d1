//! Unified error types for the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for doc-rag operations.
#[derive(Debug, Error)]
pub enum RagError {
    // ── Ingestion ───────────────────────────────────────────────────────────
    /// Input path passed to the loader does not exist.
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    /// The PDF could not be parsed or a page could not be decoded.
    #[error("pdf error in {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },

    /// The PDF yielded zero pages with readable text.
    #[error("no readable content in PDF: {0}")]
    EmptyDocument(PathBuf),

    /// A text splitter failed on a single page.
    #[error("split error: {0}")]
    Split(String),

    // ── Build ───────────────────────────────────────────────────────────────
    /// An index build was attempted with zero chunks.
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    /// Another build for the same domain holds the lock.
    #[error("a build for domain '{domain}' is already in progress (lock: {lock})")]
    BuildInProgress { domain: String, lock: PathBuf },

    // ── Load / query ────────────────────────────────────────────────────────
    /// Index or metadata file (or the active generation pointer) is missing.
    #[error("index not found: {0}")]
    IndexNotFound(PathBuf),

    /// Index and metadata store disagree, or the index file is malformed.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Vector dimensionality differs from the one recorded with the index.
    #[error("vector dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    // ── Domains / configuration ─────────────────────────────────────────────
    /// Domain name is not among the configured domains.
    #[error("unknown domain '{name}' (valid: {valid})")]
    UnknownDomain { name: String, valid: String },

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to parse an environment variable into the expected type.
    #[error("failed to parse env variable: {key} = '{value}'")]
    EnvParse { key: String, value: String },

    // ── Collaborators / plumbing ────────────────────────────────────────────
    /// Embedding backend failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Answer generation backend failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// I/O or filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RagError {
    /// Build a [`RagError::UnknownDomain`] listing the accepted names.
    pub fn unknown_domain(name: impl Into<String>, valid: &[String]) -> Self {
        RagError::UnknownDomain {
            name: name.into(),
            valid: valid.join(", "),
        }
    }
}
