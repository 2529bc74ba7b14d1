//! Finds PDF files under an input directory.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::errors::RagError;

/// Returns every `*.pdf` file below `dir` (case-insensitive extension), sorted by path.
///
/// Unreadable entries are logged and skipped.
pub fn discover_pdfs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, RagError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(RagError::SourceNotFound(dir.to_path_buf()));
    }
    trace!(target: "doc_rag::ingest", dir = %dir.display(), "scanning for pdfs");

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(target: "doc_rag::ingest", error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();

    debug!(target: "doc_rag::ingest", dir = %dir.display(), found = out.len(), "pdf discovery done");
    Ok(out)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}
