//! Builds and persists a domain's (index, metadata) pair.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::chunker::renumber_chunks;
use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::flat::FlatL2Index;
use crate::index::lock::BuildLock;
use crate::index::store::{IndexSnapshot, MetadataStore, StoreLayout, remove_generation};
use crate::record::Chunk;

/// Summary of a finished build.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildReport {
    pub domain: String,
    /// Generation directory now referenced by `CURRENT`.
    pub location: PathBuf,
    pub chunks: usize,
    pub dimension: usize,
    pub embedder_name: String,
}

/// Build result: the report plus the snapshot that was just persisted.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub report: BuildReport,
    pub snapshot: IndexSnapshot,
}

/// Writes complete corpora under `<data_root>/domains/<domain>/vectorstore`.
#[derive(Clone, Debug)]
pub struct IndexBuilder {
    data_root: PathBuf,
}

impl IndexBuilder {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn layout(&self, domain: &str) -> StoreLayout {
        StoreLayout::for_domain(&self.data_root, domain)
    }

    /// Embeds every chunk in one batch call and persists a new generation.
    ///
    /// # Errors
    /// - [`RagError::EmptyCorpus`] if `chunks` is empty.
    /// - [`RagError::BuildInProgress`] if another build holds the domain lock.
    /// - [`RagError::CorruptIndex`] if the embedder returns a different number of vectors.
    /// - [`RagError::DimensionMismatch`] if vectors disagree in length.
    #[instrument(target = "doc_rag::index", name = "build", skip_all, fields(domain = %domain, chunks = chunks.len()))]
    pub fn build(
        &self,
        domain: &str,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<BuildOutput, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        debug!(target: "doc_rag::index", domain, chunks = texts.len(), embedder = embedder.name(), "embedding corpus");
        let vectors = embedder.embed_documents(&texts)?;

        // Locked only while writing; embedding can run for minutes.
        let layout = self.layout(domain);
        let _lock = BuildLock::acquire(&layout.lock_path(), domain)?;
        commit(&layout, domain, chunks, &vectors, embedder.name())
    }

    /// Persists chunks whose vectors were computed elsewhere.
    ///
    /// Chunk ids are renumbered densely in the given order before writing.
    #[instrument(target = "doc_rag::index", name = "build", skip_all, fields(domain = %domain, chunks = chunks.len()))]
    pub fn build_with_vectors(
        &self,
        domain: &str,
        chunks: Vec<Chunk>,
        vectors: &[Vec<f32>],
        embedder_name: &str,
    ) -> Result<BuildOutput, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        let layout = self.layout(domain);
        let _lock = BuildLock::acquire(&layout.lock_path(), domain)?;
        commit(&layout, domain, chunks, vectors, embedder_name)
    }
}

/// Writes one generation and promotes it. Caller holds the build lock.
fn commit(
    layout: &StoreLayout,
    domain: &str,
    mut chunks: Vec<Chunk>,
    vectors: &[Vec<f32>],
    embedder_name: &str,
) -> Result<BuildOutput, RagError> {
    if vectors.len() != chunks.len() {
        return Err(RagError::CorruptIndex(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }
    renumber_chunks(&mut chunks);

    let index = FlatL2Index::from_vectors(vectors)?;
    let metadata = MetadataStore::new(chunks, embedder_name, index.dim());
    let snapshot = IndexSnapshot::new(index, metadata)?;

    let generation = layout.create_generation()?;
    if let Err(e) = write_and_promote(layout, &generation, &snapshot) {
        warn!(target: "doc_rag::index", domain, generation = %generation.display(), error = %e, "build failed; previous generation stays active");
        remove_generation(&generation);
        return Err(e);
    }
    layout.prune();

    let report = BuildReport {
        domain: domain.to_string(),
        location: generation,
        chunks: snapshot.chunks().len(),
        dimension: snapshot.dimension(),
        embedder_name: embedder_name.to_string(),
    };
    info!(
        target: "doc_rag::index",
        domain,
        chunks = report.chunks,
        dimension = report.dimension,
        location = %report.location.display(),
        "index built"
    );
    Ok(BuildOutput { report, snapshot })
}

fn write_and_promote(
    layout: &StoreLayout,
    generation: &Path,
    snapshot: &IndexSnapshot,
) -> Result<(), RagError> {
    snapshot.write_to(generation)?;
    layout.promote(generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::record::PageMetadata;

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0, 1.0]).collect())
        }
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![0.0, 1.0])
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        let page = PageMetadata {
            domain: "it".into(),
            source_filename: "vpn.pdf".into(),
            absolute_path: "/docs/vpn.pdf".into(),
            page_number: 1,
            total_pages: 1,
            document_id: "vpn_1".into(),
        };
        (0..n)
            .map(|i| Chunk::from_page(&page, format!("vpn setup step {i}"), 100 + i))
            .collect()
    }

    #[test]
    fn build_persists_and_renumbers() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = IndexBuilder::new(tmp.path());
        let out = builder
            .build("it", chunks(5), &HashingEmbedder::new(16))
            .unwrap();

        assert_eq!(out.report.chunks, 5);
        assert_eq!(out.report.dimension, 16);
        assert_eq!(out.report.embedder_name, "hashing-16");
        let ids: Vec<usize> = out.snapshot.chunks().iter().map(|c| c.meta.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let layout = builder.layout("it");
        assert_eq!(layout.active_dir().unwrap(), out.report.location);
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = IndexBuilder::new(tmp.path())
            .build("it", Vec::new(), &HashingEmbedder::new(8))
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
    }

    #[test]
    fn vector_count_mismatch_leaves_no_index() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = IndexBuilder::new(tmp.path());
        let err = builder.build("it", chunks(10), &ShortEmbedder).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex(_)));
        assert!(matches!(
            builder.layout("it").active_dir(),
            Err(RagError::IndexNotFound(_))
        ));
    }

    #[test]
    fn held_lock_blocks_build() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = IndexBuilder::new(tmp.path());
        let _held = BuildLock::acquire(&builder.layout("it").lock_path(), "it").unwrap();

        let err = builder
            .build("it", chunks(2), &HashingEmbedder::new(8))
            .unwrap_err();
        assert!(matches!(err, RagError::BuildInProgress { .. }));
    }

    #[test]
    fn stale_lock_file_does_not_wedge_the_domain() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = IndexBuilder::new(tmp.path());
        let lock_path = builder.layout("hr").lock_path();
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, "pid=999999 started=2025-01-01T00:00:00Z\n").unwrap();

        for _ in 0..3 {
            builder
                .build("hr", chunks(2), &HashingEmbedder::new(8))
                .unwrap();
        }
        assert!(builder.layout("hr").active_dir().is_ok());
    }

    #[test]
    fn lock_is_not_held_while_embedding() {
        struct LockCheckingEmbedder(PathBuf);

        impl Embedder for LockCheckingEmbedder {
            fn name(&self) -> &str {
                "lock-check"
            }
            fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
                // Would fail with BuildInProgress if the builder held it here.
                drop(BuildLock::acquire(&self.0, "hr")?);
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
            fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
                Ok(vec![1.0, 0.0])
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let builder = IndexBuilder::new(tmp.path());
        let embedder = LockCheckingEmbedder(builder.layout("hr").lock_path());
        let out = builder.build("hr", chunks(3), &embedder).unwrap();
        assert_eq!(out.report.chunks, 3);
    }
}
