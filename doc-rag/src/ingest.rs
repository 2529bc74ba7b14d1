//! End-to-end ingestion: PDF → pages → chunks → vectors → persisted index.
//!
//! Single files go through [`IngestPipeline::process_pdf`]. Directories go
//! through [`IngestPipeline::process_directory`], which embeds files in
//! parallel and then performs one serialized build for the domain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::chunker::Chunker;
use crate::config::AppConfig;
use crate::discovery::discover_pdfs;
use crate::domain::DomainSelector;
use crate::embed::Embedder;
use crate::embed_pool::{EmbeddedUnit, run_units};
use crate::errors::RagError;
use crate::index::{BuildOutput, BuildReport, IndexBuilder};
use crate::loader::PdfLoader;
use crate::record::Chunk;

/// Result of a directory ingest.
#[derive(Debug)]
pub struct IngestReport {
    pub domain: String,
    /// Files that contributed chunks, in input order.
    pub succeeded: Vec<PathBuf>,
    /// Files that were skipped, with the reason.
    pub failed: Vec<(PathBuf, RagError)>,
    /// Build summary for the new active generation.
    pub build: BuildReport,
}

impl IngestReport {
    pub fn location(&self) -> &Path {
        &self.build.location
    }
}

/// Loader, chunker, embedder and builder wired for one configuration.
#[derive(Clone)]
pub struct IngestPipeline {
    loader: PdfLoader,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    builder: IndexBuilder,
    domains: DomainSelector,
    workers: usize,
}

impl IngestPipeline {
    pub fn new(
        cfg: &AppConfig,
        loader: PdfLoader,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        Ok(Self {
            loader,
            chunker: Chunker::new(&cfg.chunking)?,
            embedder,
            builder: IndexBuilder::new(&cfg.data_root),
            domains: DomainSelector::from_config(cfg)?,
            workers: cfg.ingest_workers,
        })
    }

    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Replaces `domain`'s corpus with the content of one PDF.
    ///
    /// # Errors
    /// - [`RagError::UnknownDomain`] if `domain` is not configured.
    /// - [`RagError::SourceNotFound`] if `path` does not exist.
    /// - Any loader, embedding or build error.
    pub fn process_pdf(&self, path: &Path, domain: &str) -> Result<BuildOutput, RagError> {
        let domain = self.domains.validate(domain)?;
        if !path.exists() {
            return Err(RagError::SourceNotFound(path.to_path_buf()));
        }
        info!(target: "doc_rag::ingest", file = %path.display(), domain = %domain, "processing pdf");

        let pages = self.loader.load(path, &domain)?;
        let chunks = self.chunker.chunk_pages(&pages);
        self.builder.build(&domain, chunks, self.embedder.as_ref())
    }

    /// Replaces `domain`'s corpus with every PDF found under `dir`.
    ///
    /// Per-file failures are logged and reported; the build runs on whatever
    /// succeeded. Nothing usable at all fails with [`RagError::EmptyCorpus`].
    #[instrument(target = "doc_rag::ingest", name = "ingest_dir", skip_all, fields(dir = %dir.display(), domain = %domain))]
    pub async fn process_directory(
        &self,
        dir: &Path,
        domain: &str,
    ) -> Result<IngestReport, RagError> {
        let domain = self.domains.validate(domain)?;
        let files = discover_pdfs(dir)?;
        if files.is_empty() {
            warn!(target: "doc_rag::ingest", dir = %dir.display(), "no pdf files found");
            return Err(RagError::EmptyCorpus);
        }

        let loader = self.loader.clone();
        let chunker = self.chunker.clone();
        let embedder = Arc::clone(&self.embedder);
        let unit_domain = domain.clone();
        let outcomes = run_units(files, self.workers, move |path| {
            embed_file(&loader, &chunker, embedder.as_ref(), path, &unit_domain)
        })
        .await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        for (_, path, res) in outcomes {
            match res {
                Ok(unit) => {
                    chunks.extend(unit.chunks);
                    vectors.extend(unit.vectors);
                    succeeded.push(path);
                }
                Err(e) => {
                    error!(target: "doc_rag::ingest", file = %path.display(), error = %e, "file skipped");
                    failed.push((path, e));
                }
            }
        }
        info!(
            target: "doc_rag::ingest",
            domain = %domain,
            succeeded = succeeded.len(),
            failed = failed.len(),
            chunks = chunks.len(),
            "files embedded"
        );

        let builder = self.builder.clone();
        let name = self.embedder.name().to_string();
        let build_domain = domain.clone();
        let out = tokio::task::spawn_blocking(move || {
            builder.build_with_vectors(&build_domain, chunks, &vectors, &name)
        })
        .await??;

        Ok(IngestReport {
            domain,
            succeeded,
            failed,
            build: out.report,
        })
    }
}

/// One worker unit: load, chunk and embed a single file.
fn embed_file(
    loader: &PdfLoader,
    chunker: &Chunker,
    embedder: &dyn Embedder,
    path: &Path,
    domain: &str,
) -> Result<EmbeddedUnit, RagError> {
    let pages = loader.load(path, domain)?;
    let chunks = chunker.chunk_pages(&pages);
    if chunks.is_empty() {
        return Err(RagError::EmptyDocument(path.to_path_buf()));
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_documents(&texts)?;
    if vectors.len() != chunks.len() {
        return Err(RagError::CorruptIndex(format!(
            "embedder returned {} vectors for {} chunks of {}",
            vectors.len(),
            chunks.len(),
            path.display()
        )));
    }
    Ok(EmbeddedUnit { chunks, vectors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::loader::tests::FakeExtractor;
    use crate::retriever::Retriever;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        p
    }

    fn pipeline(root: &Path, extractor: FakeExtractor) -> IngestPipeline {
        let cfg = AppConfig {
            data_root: root.to_path_buf(),
            ..AppConfig::default()
        };
        IngestPipeline::new(
            &cfg,
            PdfLoader::new(Arc::new(extractor)),
            Arc::new(HashingEmbedder::new(32)),
        )
        .unwrap()
    }

    #[test]
    fn process_pdf_builds_domain_index() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = touch(tmp.path(), "leave.pdf");
        let p = pipeline(
            &tmp.path().join("data"),
            FakeExtractor::with("leave.pdf", &["Annual leave is 25 days.", "", "Sick leave needs a note."]),
        );

        let out = p.process_pdf(&pdf, "HR").unwrap();
        assert_eq!(out.report.domain, "hr");
        assert_eq!(out.report.chunks, 2);
        assert!(out.report.location.starts_with(tmp.path().join("data/domains/hr/vectorstore")));

        let pages: Vec<u32> = out
            .snapshot
            .chunks()
            .iter()
            .map(|c| c.meta.page.page_number)
            .collect();
        assert_eq!(pages, vec![1, 3]);
    }

    #[test]
    fn process_pdf_rejects_bad_input() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = touch(tmp.path(), "x.pdf");
        let p = pipeline(tmp.path(), FakeExtractor::with("x.pdf", &["text"]));

        assert!(matches!(
            p.process_pdf(&pdf, "sales"),
            Err(RagError::UnknownDomain { .. })
        ));
        assert!(matches!(
            p.process_pdf(&tmp.path().join("missing.pdf"), "hr"),
            Err(RagError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn directory_ingest_reports_partial_success() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        touch(&docs, "a.pdf");
        touch(&docs, "b.pdf");
        touch(&docs, "blank.pdf");
        touch(&docs, "broken.pdf");

        let extractor = FakeExtractor::default();
        extractor.insert("a.pdf", &["Expense reports are due monthly."]);
        extractor.insert("b.pdf", &["Travel must be pre-approved.", "Per diem is fixed."]);
        extractor.insert("blank.pdf", &["  ", ""]);

        let p = pipeline(&tmp.path().join("data"), extractor);
        let report = p.process_directory(&docs, "finance").await.unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.build.chunks, 3);
        assert!(report.failed.iter().any(|(_, e)| matches!(e, RagError::EmptyDocument(_))));
        assert!(report.failed.iter().any(|(_, e)| matches!(e, RagError::Pdf { .. })));

        let r = Retriever::load(
            report.location().parent().unwrap(),
            p.embedder().clone(),
            Default::default(),
        )
        .unwrap();
        let ids: Vec<usize> = r.snapshot().chunks().iter().map(|c| c.meta.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(r.snapshot().chunks()[0].meta.page.source_filename, "a.pdf");
    }

    #[tokio::test]
    async fn directory_without_usable_files_is_empty_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "blank.pdf");
        let p = pipeline(&tmp.path().join("data"), FakeExtractor::with("blank.pdf", &[""]));
        assert!(matches!(
            p.process_directory(tmp.path(), "it").await,
            Err(RagError::EmptyCorpus)
        ));
    }
}
