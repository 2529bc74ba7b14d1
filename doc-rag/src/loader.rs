//! PDF loading: per-page text plus structural metadata.
//!
//! Decoding sits behind [`PageExtractor`] so that the pipeline can be driven by
//! any backend; [`LopdfExtractor`] is the default one.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::RagError;
use crate::normalize::{has_content, normalize_page_text};
use crate::record::{PageDocument, PageMetadata};

/// Extracts raw text for every page of a document.
pub trait PageExtractor: Send + Sync {
    /// Returns one entry per page in page order (index 0 is page 1).
    /// Pages without extractable text are returned as empty strings.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RagError>;
}

/// [`PageExtractor`] backed by the `lopdf` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RagError> {
        let pdf_err = |reason: String| RagError::Pdf {
            path: path.to_path_buf(),
            reason,
        };

        let doc = lopdf::Document::load(path).map_err(|e| pdf_err(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(pdf_err("document is encrypted".into()));
        }

        let pages = doc.get_pages();
        let mut out = Vec::with_capacity(pages.len());
        for page_no in pages.keys() {
            match doc.extract_text(&[*page_no]) {
                Ok(text) => out.push(text),
                Err(e) => {
                    warn!(
                        target: "doc_rag::loader",
                        path = %path.display(),
                        page = page_no,
                        error = %e,
                        "page text extraction failed; treating page as empty"
                    );
                    out.push(String::new());
                }
            }
        }
        Ok(out)
    }
}

/// Loads PDFs into [`PageDocument`]s.
#[derive(Clone)]
pub struct PdfLoader {
    extractor: Arc<dyn PageExtractor>,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new(Arc::new(LopdfExtractor))
    }
}

impl PdfLoader {
    pub fn new(extractor: Arc<dyn PageExtractor>) -> Self {
        Self { extractor }
    }

    /// Loads every page with readable text, tagging it with `domain`.
    ///
    /// Blank pages are skipped; page numbers keep their position in the file.
    ///
    /// # Errors
    /// - [`RagError::SourceNotFound`] if `path` does not exist.
    /// - [`RagError::Pdf`] if the document cannot be decoded.
    /// - [`RagError::EmptyDocument`] if no page yields readable text.
    pub fn load(&self, path: &Path, domain: &str) -> Result<Vec<PageDocument>, RagError> {
        if !path.exists() {
            return Err(RagError::SourceNotFound(path.to_path_buf()));
        }

        let abs_path = std::path::absolute(path)?;
        let stem = abs_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source_filename = format!("{stem}.pdf");

        let raw_pages = self.extractor.extract_pages(path)?;
        let total_pages = u32::try_from(raw_pages.len()).unwrap_or(u32::MAX);

        let mut docs = Vec::with_capacity(raw_pages.len());
        for (idx, raw) in raw_pages.into_iter().enumerate() {
            let page_number = idx as u32 + 1;
            let text = normalize_page_text(&raw);
            if !has_content(&text) {
                debug!(
                    target: "doc_rag::loader",
                    file = %source_filename,
                    page = page_number,
                    "skipping page without readable text"
                );
                continue;
            }
            docs.push(PageDocument {
                text,
                meta: PageMetadata {
                    domain: domain.to_string(),
                    source_filename: source_filename.clone(),
                    absolute_path: abs_path.to_string_lossy().into_owned(),
                    page_number,
                    total_pages,
                    document_id: PageMetadata::document_id_for(&stem, page_number),
                },
            });
        }

        if docs.is_empty() {
            return Err(RagError::EmptyDocument(path.to_path_buf()));
        }

        info!(
            target: "doc_rag::loader",
            file = %source_filename,
            pages = docs.len(),
            total_pages,
            "loaded pdf"
        );
        Ok(docs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory extractor keyed by file name; files must still exist on disk.
    #[derive(Default)]
    pub(crate) struct FakeExtractor {
        pub pages: Mutex<HashMap<String, Vec<String>>>,
    }

    impl FakeExtractor {
        pub fn with(name: &str, pages: &[&str]) -> Self {
            let me = Self::default();
            me.insert(name, pages);
            me
        }

        pub fn insert(&self, name: &str, pages: &[&str]) {
            self.pages.lock().unwrap().insert(
                name.to_string(),
                pages.iter().map(|p| p.to_string()).collect(),
            );
        }
    }

    impl PageExtractor for FakeExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RagError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.pages
                .lock()
                .unwrap()
                .get(&name)
                .cloned()
                .ok_or_else(|| RagError::Pdf {
                    path: path.to_path_buf(),
                    reason: "not a pdf".into(),
                })
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        p
    }

    #[test]
    fn skips_blank_pages_and_keeps_numbering() {
        let tmp = tempfile::tempdir().unwrap();
        let path = touch(tmp.path(), "policy.pdf");
        let loader = PdfLoader::new(Arc::new(FakeExtractor::with(
            "policy.pdf",
            &["First page", "   \n ", "Third page"],
        )));

        let docs = loader.load(&path, "hr").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].meta.page_number, 1);
        assert_eq!(docs[1].meta.page_number, 3);
        assert_eq!(docs[1].meta.total_pages, 3);
        assert_eq!(docs[1].meta.document_id, "policy_3");
        assert_eq!(docs[0].meta.source_filename, "policy.pdf");
        assert_eq!(docs[0].meta.domain, "hr");
        assert!(Path::new(&docs[0].meta.absolute_path).is_absolute());
    }

    #[test]
    fn all_blank_is_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = touch(tmp.path(), "scan.pdf");
        let loader = PdfLoader::new(Arc::new(FakeExtractor::with("scan.pdf", &["", " "])));
        assert!(matches!(
            loader.load(&path, "hr"),
            Err(RagError::EmptyDocument(_))
        ));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let loader = PdfLoader::new(Arc::new(FakeExtractor::default()));
        assert!(matches!(
            loader.load(Path::new("/definitely/not/here.pdf"), "hr"),
            Err(RagError::SourceNotFound(_))
        ));
    }

    #[test]
    fn lopdf_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();
        let loader = PdfLoader::default();
        assert!(matches!(loader.load(&path, "hr"), Err(RagError::Pdf { .. })));
    }
}
