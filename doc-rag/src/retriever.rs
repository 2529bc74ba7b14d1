//! Query-time access to a persisted corpus.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::config::SearchConfig;
use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::store::{IndexSnapshot, StoreLayout};
use crate::record::{RetrievalResult, SearchQuery};

/// Immutable snapshot of one domain's corpus plus the embedder used to query it.
pub struct Retriever {
    snapshot: IndexSnapshot,
    embedder: Arc<dyn Embedder>,
    defaults: SearchConfig,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("chunks", &self.len())
            .field("dimension", &self.dimension())
            .field("embedder", &self.embedder.name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Retriever {
    /// Loads the active generation under a `vectorstore` directory.
    ///
    /// `dir` may also point directly at a generation directory.
    ///
    /// # Errors
    /// - [`RagError::IndexNotFound`] if `CURRENT` or either file is missing.
    /// - [`RagError::CorruptIndex`] if the pair is malformed or misaligned.
    pub fn load(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        defaults: SearchConfig,
    ) -> Result<Self, RagError> {
        let generation = if dir.join(crate::index::store::METADATA_FILE).is_file() {
            dir.to_path_buf()
        } else {
            StoreLayout::at(dir).active_dir()?
        };
        let snapshot = IndexSnapshot::read_from(&generation)?;

        if snapshot.embedder_name() != embedder.name() {
            warn!(
                target: "doc_rag::retriever",
                index_embedder = snapshot.embedder_name(),
                query_embedder = embedder.name(),
                "index was built with a different embedder"
            );
        }
        debug!(
            target: "doc_rag::retriever",
            generation = %generation.display(),
            chunks = snapshot.chunks().len(),
            dimension = snapshot.dimension(),
            "index loaded"
        );
        Ok(Self::from_snapshot(snapshot, embedder, defaults))
    }

    /// Wraps an in-memory snapshot, e.g. the one returned by a build.
    pub fn from_snapshot(
        snapshot: IndexSnapshot,
        embedder: Arc<dyn Embedder>,
        defaults: SearchConfig,
    ) -> Self {
        Self {
            snapshot,
            embedder,
            defaults,
        }
    }

    /// Query with the configured `top_k` and threshold.
    pub fn query<'a>(&self, text: &'a str) -> SearchQuery<'a> {
        SearchQuery::new(text)
            .with_top_k(self.defaults.top_k)
            .with_threshold(self.defaults.score_threshold)
    }

    /// Top-k chunks by ascending distance.
    ///
    /// Only an invalid query ([`SearchQuery::validate`]) and
    /// [`RagError::DimensionMismatch`] are returned; every other failure is
    /// logged and yields an empty list.
    pub fn search(&self, query: SearchQuery<'_>) -> Result<Vec<RetrievalResult>, RagError> {
        query.validate()?;
        match self.try_search(query) {
            Ok(hits) => Ok(hits),
            Err(e @ RagError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                warn!(target: "doc_rag::retriever", error = %e, "search failed; returning no results");
                Ok(Vec::new())
            }
        }
    }

    /// Like [`Retriever::search`] but propagates every error.
    #[instrument(target = "doc_rag::retriever", name = "search", level = "debug", skip_all, fields(k = query.top_k))]
    pub fn try_search(&self, query: SearchQuery<'_>) -> Result<Vec<RetrievalResult>, RagError> {
        query.validate()?;
        let vector = self.embedder.embed_query(query.text)?;
        if vector.is_empty() {
            return Err(RagError::Embedding("embedder returned an empty query vector".into()));
        }
        let hits = self.snapshot.index().search(&vector, query.top_k)?;

        let chunks = self.snapshot.chunks();
        let mut out = Vec::with_capacity(hits.len());
        for (row, score) in hits {
            if query.score_threshold.is_some_and(|t| score > t) {
                continue;
            }
            let chunk = chunks.get(row).ok_or_else(|| {
                RagError::CorruptIndex(format!("row {row} has no metadata entry"))
            })?;
            out.push(RetrievalResult {
                chunk: chunk.clone(),
                score,
            });
        }

        trace!(
            target: "doc_rag::retriever",
            k = query.top_k,
            threshold = ?query.score_threshold,
            hits = out.len(),
            "search done"
        );
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.snapshot.chunks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.snapshot.dimension()
    }

    pub fn embedder_name(&self) -> &str {
        self.snapshot.embedder_name()
    }

    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FlatL2Index, MetadataStore};
    use crate::record::{Chunk, PageMetadata};

    /// Returns a fixed query vector regardless of input.
    struct FixedEmbedder(Vec<f32>);

    impl Embedder for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }
        fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::Embedding("offline".into()))
        }
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Err(RagError::Embedding("offline".into()))
        }
    }

    /// Rows at squared distances 0.1, 0.5, 0.8, 0.9, 1.2 from the origin.
    fn snapshot() -> IndexSnapshot {
        let dists = [0.1f32, 0.5, 0.8, 0.9, 1.2];
        let vectors: Vec<Vec<f32>> = dists.iter().map(|d| vec![d.sqrt(), 0.0]).collect();
        let page = PageMetadata {
            domain: "finance".into(),
            source_filename: "q3.pdf".into(),
            absolute_path: "/q3.pdf".into(),
            page_number: 2,
            total_pages: 9,
            document_id: "q3_2".into(),
        };
        let chunks = (0..5)
            .map(|i| Chunk::from_page(&page, format!("row {i}"), i))
            .collect();
        IndexSnapshot::new(
            FlatL2Index::from_vectors(&vectors).unwrap(),
            MetadataStore::new(chunks, "fixed", 2),
        )
        .unwrap()
    }

    fn retriever(embedder: Arc<dyn Embedder>) -> Retriever {
        Retriever::from_snapshot(snapshot(), embedder, SearchConfig::default())
    }

    #[test]
    fn threshold_drops_far_rows() {
        let r = retriever(Arc::new(FixedEmbedder(vec![0.0, 0.0])));
        let hits = r
            .search(SearchQuery::new("q").with_top_k(5).with_threshold(Some(0.85)))
            .unwrap();
        let rows: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(rows, vec!["row 0", "row 1", "row 2"]);
        assert!(hits.iter().all(|h| h.score <= 0.85));
    }

    #[test]
    fn default_query_uses_config() {
        let r = retriever(Arc::new(FixedEmbedder(vec![0.0, 0.0])));
        let hits = r.search(r.query("q")).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let r = retriever(Arc::new(FixedEmbedder(vec![0.0, 0.0, 0.0])));
        assert!(matches!(
            r.search(SearchQuery::new("q")),
            Err(RagError::DimensionMismatch { got: 3, want: 2 })
        ));
    }

    #[test]
    fn nan_or_negative_threshold_is_rejected_not_ignored() {
        let r = retriever(Arc::new(FixedEmbedder(vec![0.0, 0.0])));
        for t in [f32::NAN, -1.0] {
            let q = SearchQuery::new("q").with_top_k(5).with_threshold(Some(t));
            assert!(matches!(r.search(q), Err(RagError::Config(_))), "t={t}");
            assert!(matches!(r.try_search(q), Err(RagError::Config(_))), "t={t}");
        }
    }

    #[test]
    fn embedder_failure_degrades_to_empty() {
        let r = retriever(Arc::new(FailingEmbedder));
        assert!(r.search(SearchQuery::new("q")).unwrap().is_empty());
        assert!(matches!(
            r.try_search(SearchQuery::new("q")),
            Err(RagError::Embedding(_))
        ));
    }

    #[test]
    fn empty_query_vector_degrades_to_empty() {
        let r = retriever(Arc::new(FixedEmbedder(Vec::new())));
        assert!(r.search(SearchQuery::new("q")).unwrap().is_empty());
    }
}
