//! Document retrieval for question answering over PDF corpora.
//!
//! This crate provides:
//! - PDF loading and recursive chunking with overlap
//! - Exact L2 vector indexes persisted per knowledge domain
//! - Retrieval with top-k and distance thresholds, plus context assembly for an LLM
//!
//! [`DocRag`] wires everything from an [`AppConfig`]; the modules stay usable
//! on their own for callers that need finer control.

pub mod chunker;
pub mod config;
mod discovery;
pub mod domain;
pub mod embed;
mod embed_pool;
mod errors;
pub mod index;
pub mod ingest;
pub mod loader;
mod normalize;
pub mod qa;
pub mod record;
pub mod retriever;
pub mod telemetry;

pub use chunker::{Chunker, RecursiveSplitter, TextSplitter};
pub use config::{AppConfig, ChunkingConfig, EmbedderKind, EmbeddingConfig, SearchConfig};
pub use discovery::discover_pdfs;
pub use domain::{ActiveCorpus, DomainCapabilities, DomainSelector, Tool};
pub use embed::{Embedder, HashingEmbedder, OllamaEmbedder};
pub use errors::RagError;
pub use index::{BuildOutput, BuildReport, IndexBuilder, StoreSummary};
pub use ingest::{IngestPipeline, IngestReport};
pub use loader::{LopdfExtractor, PageExtractor, PdfLoader};
pub use qa::{Answer, AnswerContext, AnswerGenerator, ChatTurn, GenerationInput, Role};
pub use record::{Chunk, ChunkMetadata, PageDocument, PageMetadata, RetrievalResult, SearchQuery};
pub use retriever::Retriever;

use std::path::Path;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::index::IndexSnapshot;

/// High-level facade over ingestion, the active domain corpus and retrieval.
///
/// This is the single entry point recommended for application code.
pub struct DocRag {
    cfg: AppConfig,
    pipeline: IngestPipeline,
    corpus: ActiveCorpus,
}

impl DocRag {
    /// Builds the facade with the configured embedder and the `lopdf` loader.
    ///
    /// # Errors
    /// Returns `RagError::Config`/`UnknownDomain` for invalid configuration or
    /// `RagError::Embedding` if the embedder cannot be constructed.
    pub fn new(cfg: AppConfig) -> Result<Self, RagError> {
        let embedder = embed::from_config(&cfg.embedding)?;
        Self::with_parts(cfg, PdfLoader::default(), embedder)
    }

    /// Same as [`DocRag::new`] with explicit collaborators.
    pub fn with_parts(
        cfg: AppConfig,
        loader: PdfLoader,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        cfg.validate()?;
        trace!("DocRag::with_parts data_root={:?}", cfg.data_root);
        let pipeline = IngestPipeline::new(&cfg, loader, Arc::clone(&embedder))?;
        let corpus = ActiveCorpus::new(&cfg, embedder)?;
        Ok(Self {
            cfg,
            pipeline,
            corpus,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    /// Replaces `domain`'s corpus with one PDF and returns the build summary.
    pub fn process_pdf(&self, path: &Path, domain: &str) -> Result<BuildReport, RagError> {
        let out = self.pipeline.process_pdf(path, domain)?;
        self.reload_if_active(&out.report.domain);
        Ok(out.report)
    }

    /// Replaces `domain`'s corpus with every PDF below `dir`.
    pub async fn process_directory(
        &self,
        dir: &Path,
        domain: &str,
    ) -> Result<IngestReport, RagError> {
        let report = self.pipeline.process_directory(dir, domain).await?;
        self.reload_if_active(&report.domain);
        Ok(report)
    }

    pub fn current_domain(&self) -> String {
        self.corpus.current_domain()
    }

    /// Switches the active domain; see [`ActiveCorpus::switch_domain`].
    pub fn switch_domain(&self, name: &str) -> Result<Option<Arc<Retriever>>, RagError> {
        self.corpus.switch_domain(name)
    }

    /// Loads a standalone retriever for `domain`, independent of the active one.
    pub fn load_retriever(&self, domain: &str) -> Result<Retriever, RagError> {
        let domain = DomainSelector::from_config(&self.cfg)?.validate(domain)?;
        let layout = self.pipeline.builder().layout(&domain);
        Retriever::load(
            layout.root(),
            Arc::clone(self.pipeline.embedder()),
            self.cfg.search,
        )
    }

    /// Query using the configured `top_k` and threshold.
    pub fn query<'a>(&self, text: &'a str) -> SearchQuery<'a> {
        SearchQuery::new(text)
            .with_top_k(self.cfg.search.top_k)
            .with_threshold(self.cfg.search.score_threshold)
    }

    /// Searches the active domain's corpus.
    pub fn search(&self, query: SearchQuery<'_>) -> Result<Vec<RetrievalResult>, RagError> {
        self.corpus.search(query)
    }

    /// Retrieves context for `question` in the active domain and asks `generator`.
    ///
    /// Pass an empty `history` for a single-shot question.
    pub fn ask(
        &self,
        generator: &dyn AnswerGenerator,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<Answer, RagError> {
        let hits = self.search(self.query(question))?;
        qa::ask(generator, question, &self.current_domain(), &hits, history)
    }

    /// Loads `domain`'s active generation with full integrity checks and
    /// summarizes it.
    pub fn verify(&self, domain: &str) -> Result<StoreSummary, RagError> {
        let domain = DomainSelector::from_config(&self.cfg)?.validate(domain)?;
        let dir = self.pipeline.builder().layout(&domain).active_dir()?;
        let snapshot = IndexSnapshot::read_from(&dir)?;
        Ok(snapshot.summary(&domain, dir))
    }

    fn reload_if_active(&self, domain: &str) {
        if self.corpus.current_domain() != domain {
            return;
        }
        if let Err(e) = self.corpus.refresh() {
            warn!(target: "doc_rag::domain", domain, error = %e, "failed to reload active corpus after build");
        }
    }
}
