//! Page chunking with separator-aware splits and character overlap.
//!
//! [`RecursiveSplitter`] tries separators from coarsest to finest: the text is
//! cut on the first separator it contains, small pieces are greedily merged
//! into windows of at most `chunk_size` characters, and oversized pieces are
//! split again with the next separator. The empty separator cuts between
//! characters, so every input ends up in windows no longer than `chunk_size`.
//!
//! Overlap is applied inside one merge run only. When an oversized piece is
//! split on its own (e.g. a long paragraph), its first chunk shares no text
//! with the last chunk of the preceding piece.
//!
//! All lengths are counted in `char`s, not bytes.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::errors::RagError;
use crate::normalize::has_content;
use crate::record::{Chunk, PageDocument};

/// Splits one page of text into chunk texts.
pub trait TextSplitter: Send + Sync {
    fn split_text(&self, text: &str) -> Result<Vec<String>, RagError>;
}

/// Recursive character splitter.
#[derive(Clone, Debug)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// # Errors
    /// [`RagError::Config`] if `cfg` fails validation.
    pub fn new(cfg: &ChunkingConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        Ok(Self {
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
            separators: cfg.separators.clone(),
        })
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator present in the text; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }

        final_chunks
    }

    /// Greedy merge of small pieces into overlapping windows.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_trimmed(&current) {
                    docs.push(doc);
                }
                // Keep at most `chunk_overlap` chars as the seed of the next window,
                // and always leave room for the incoming piece.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_trimmed(&current) {
            docs.push(doc);
        }
        docs
    }
}

impl TextSplitter for RecursiveSplitter {
    fn split_text(&self, text: &str) -> Result<Vec<String>, RagError> {
        Ok(self.split_recursive(text, &self.separators))
    }
}

/// Turns pages into chunks with dense, run-scoped ids.
#[derive(Clone)]
pub struct Chunker {
    splitter: Arc<dyn TextSplitter>,
}

impl Chunker {
    /// Chunker using a [`RecursiveSplitter`] built from `cfg`.
    pub fn new(cfg: &ChunkingConfig) -> Result<Self, RagError> {
        Ok(Self::with_splitter(Arc::new(RecursiveSplitter::new(cfg)?)))
    }

    pub fn with_splitter(splitter: Arc<dyn TextSplitter>) -> Self {
        Self { splitter }
    }

    /// Splits every page, numbering chunks `0..n` in production order.
    ///
    /// A page whose split fails is logged and skipped; blank pages yield nothing.
    pub fn chunk_pages(&self, pages: &[PageDocument]) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();

        for page in pages {
            if !has_content(&page.text) {
                continue;
            }
            let parts = match self.splitter.split_text(&page.text) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(
                        target: "doc_rag::chunker",
                        document_id = %page.meta.document_id,
                        error = %e,
                        "failed to split page; skipping it"
                    );
                    continue;
                }
            };
            for text in parts.into_iter().filter(|t| has_content(t)) {
                let id = chunks.len();
                chunks.push(Chunk::from_page(&page.meta, text, id));
            }
            debug!(
                target: "doc_rag::chunker",
                document_id = %page.meta.document_id,
                total = chunks.len(),
                "page chunked"
            );
        }

        info!(
            target: "doc_rag::chunker",
            pages = pages.len(),
            chunks = chunks.len(),
            "split pages into chunks"
        );
        chunks
    }
}

/// Reassigns `chunk_id` as `0..n` following slice order.
pub fn renumber_chunks(chunks: &mut [Chunk]) {
    for (i, c) in chunks.iter_mut().enumerate() {
        c.meta.chunk_id = i;
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on `sep`, attaching each separator to the start of the following piece.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut out = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            out.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PageMetadata;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(&ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            ..ChunkingConfig::default()
        })
        .unwrap()
    }

    fn page(file: &str, n: u32, text: &str) -> PageDocument {
        PageDocument {
            text: text.to_string(),
            meta: PageMetadata {
                domain: "hr".into(),
                source_filename: format!("{file}.pdf"),
                absolute_path: format!("/docs/{file}.pdf"),
                page_number: n,
                total_pages: 3,
                document_id: PageMetadata::document_id_for(file, n),
            },
        }
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{i:03}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Length of the longest prefix of `next` that is also a suffix of `prev`.
    fn shared_overlap(prev: &str, next: &str) -> usize {
        (1..=next.len())
            .rev()
            .find(|&k| next.is_char_boundary(k) && prev.ends_with(&next[..k]))
            .unwrap_or(0)
    }

    #[test]
    fn split_keeps_separator_at_start() {
        assert_eq!(split_keep_separator("a\nb\nc", "\n"), vec!["a", "\nb", "\nc"]);
        assert_eq!(split_keep_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
        assert_eq!(split_keep_separator("hé", ""), vec!["h", "é"]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let out = splitter(100, 10).split_text("  Short paragraph.  ").unwrap();
        assert_eq!(out, vec!["Short paragraph.".to_string()]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = words(60);
        let out = splitter(50, 20).split_text(&text).unwrap();
        assert!(out.len() > 1);
        for c in &out {
            assert!(c.chars().count() <= 50, "too long: {c:?}");
        }
        for pair in out.windows(2) {
            let shared = shared_overlap(&pair[0], &pair[1]);
            assert!(shared > 0, "no overlap between {:?} and {:?}", pair[0], pair[1]);
            assert!(shared <= 20);
        }
    }

    #[test]
    fn overlap_stops_at_long_paragraph_boundaries() {
        let para = |tag: &str| {
            (0..12)
                .map(|i| format!("{tag}{i:03}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let text = format!("{}\n\n{}", para("word"), para("term"));
        let out = splitter(50, 20).split_text(&text).unwrap();

        let first_b = out.iter().position(|c| c.contains("term")).unwrap();
        assert!(first_b > 0);
        assert!(out[..first_b].iter().all(|c| !c.contains("term")));
        assert!(out[first_b..].iter().all(|c| !c.contains("word")));

        // Each paragraph overlaps internally, but not across the boundary.
        for (i, pair) in out.windows(2).enumerate() {
            let shared = shared_overlap(&pair[0], &pair[1]);
            if i + 1 == first_b {
                assert_eq!(shared, 0, "{:?} / {:?}", pair[0], pair[1]);
            } else {
                assert!(shared > 0, "{:?} / {:?}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn no_words_are_lost() {
        let text = format!("{}\n\n{}\n{}", words(30), words(12), words(45));
        let out = splitter(80, 15).split_text(&text).unwrap();
        let joined = out.join(" ");
        for w in text.split_whitespace() {
            assert!(joined.contains(w), "missing {w}");
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let a = "Alpha paragraph text.";
        let b = "Beta paragraph text.";
        let out = splitter(30, 5).split_text(&format!("{a}\n\n{b}")).unwrap();
        assert_eq!(out, vec![a.to_string(), b.to_string()]);
    }

    #[test]
    fn unbroken_text_falls_back_to_character_cuts() {
        let text = "x".repeat(95);
        let out = splitter(40, 10).split_text(&text).unwrap();
        assert!(out.len() >= 3);
        assert!(out.iter().all(|c| c.chars().count() <= 40));
        for pair in out.windows(2) {
            assert_eq!(shared_overlap(&pair[0], &pair[1]).min(10), 10);
        }
    }

    #[test]
    fn counts_chars_not_bytes() {
        let text = "é".repeat(30);
        let out = splitter(10, 0).split_text(&text).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn chunk_ids_are_dense_and_metadata_is_inherited() {
        let chunker = Chunker::with_splitter(Arc::new(splitter(40, 10)));
        let pages = vec![page("a", 1, &words(20)), page("b", 2, &words(15))];
        let chunks = chunker.chunk_pages(&pages);

        let ids: Vec<usize> = chunks.iter().map(|c| c.meta.chunk_id).collect();
        assert_eq!(ids, (0..chunks.len()).collect::<Vec<_>>());
        for c in &chunks {
            let src = pages
                .iter()
                .find(|p| p.meta.document_id == c.meta.page.document_id)
                .unwrap();
            assert_eq!(c.meta.page, src.meta);
            assert_eq!(c.meta.chunk_size, c.text.chars().count());
            assert!(src.text.contains(&c.text));
        }
    }

    #[test]
    fn overlap_never_crosses_pages() {
        let chunker = Chunker::with_splitter(Arc::new(splitter(40, 15)));
        let pages = vec![page("a", 1, "alpha beta gamma"), page("a", 2, "delta epsilon")];
        let chunks = chunker.chunk_pages(&pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "delta epsilon");
    }

    #[test]
    fn blank_pages_produce_nothing() {
        let chunker = Chunker::new(&ChunkingConfig::default()).unwrap();
        let pages = vec![page("a", 1, "one"), page("a", 2, "  \n"), page("a", 3, "three")];
        let chunks = chunker.chunk_pages(&pages);
        let numbers: Vec<u32> = chunks.iter().map(|c| c.meta.page.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    struct FailOn(&'static str);

    impl TextSplitter for FailOn {
        fn split_text(&self, text: &str) -> Result<Vec<String>, RagError> {
            if text.contains(self.0) {
                Err(RagError::Split("boom".into()))
            } else {
                Ok(vec![text.to_string()])
            }
        }
    }

    #[test]
    fn failing_page_is_skipped() {
        let chunker = Chunker::with_splitter(Arc::new(FailOn("bad")));
        let pages = vec![page("a", 1, "good"), page("a", 2, "bad"), page("a", 3, "fine")];
        let chunks = chunker.chunk_pages(&pages);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["good", "fine"]);
        assert_eq!(chunks[1].meta.chunk_id, 1);
    }

    #[test]
    fn renumber_makes_ids_dense() {
        let p = page("a", 1, "x");
        let mut chunks = vec![
            Chunk::from_page(&p.meta, "x".into(), 5),
            Chunk::from_page(&p.meta, "y".into(), 0),
        ];
        renumber_chunks(&mut chunks);
        assert_eq!(chunks[0].meta.chunk_id, 0);
        assert_eq!(chunks[1].meta.chunk_id, 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..ChunkingConfig::default()
        };
        assert!(matches!(RecursiveSplitter::new(&cfg), Err(RagError::Config(_))));
    }
}
