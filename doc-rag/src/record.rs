//! Core data models used by the library.

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Structural attributes of one extracted PDF page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub domain: String,
    /// File name including the `.pdf` extension.
    pub source_filename: String,
    pub absolute_path: String,
    /// 1-based page number.
    pub page_number: u32,
    pub total_pages: u32,
    /// `{file_stem}_{page_number}`.
    pub document_id: String,
}

impl PageMetadata {
    /// Deterministic document id for a page of a file.
    pub fn document_id_for(file_stem: &str, page_number: u32) -> String {
        format!("{file_stem}_{page_number}")
    }
}

/// One page of extracted text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub text: String,
    pub meta: PageMetadata,
}

/// Page attributes plus chunk-specific fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub page: PageMetadata,
    /// Dense, build-scoped sequence number.
    pub chunk_id: usize,
    /// Character count of the chunk text.
    pub chunk_size: usize,
    pub is_chunk: bool,
}

/// A bounded slice of a page's text with inherited metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub meta: ChunkMetadata,
}

impl Chunk {
    /// Creates a chunk from a page, copying the page attributes.
    pub fn from_page(page: &PageMetadata, text: String, chunk_id: usize) -> Self {
        let chunk_size = text.chars().count();
        Self {
            text,
            meta: ChunkMetadata {
                page: page.clone(),
                chunk_id,
                chunk_size,
                is_chunk: true,
            },
        }
    }

    /// `"{filename} p.{page}"`, used when rendering citations.
    pub fn citation(&self) -> String {
        format!(
            "{} p.{}",
            self.meta.page.source_filename, self.meta.page.page_number
        )
    }
}

/// A chunk with the distance it was retrieved at (lower is closer).
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Query parameters for retrieval.
#[derive(Clone, Copy, Debug)]
pub struct SearchQuery<'a> {
    pub text: &'a str,
    pub top_k: usize,
    pub score_threshold: Option<f32>,
}

impl<'a> SearchQuery<'a> {
    /// Query with the default `k = 3` and no threshold.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            top_k: 3,
            score_threshold: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Rejects `top_k == 0` and thresholds that are NaN, infinite or negative.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be > 0".into()));
        }
        match self.score_threshold {
            Some(t) if !t.is_finite() || t < 0.0 => Err(RagError::Config(format!(
                "score threshold must be a non-negative number, got {t}"
            ))),
            _ => Ok(()),
        }
    }
}
