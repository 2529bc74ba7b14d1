//! Text normalization for extracted PDF pages.
//!
//! PDF text extraction tends to produce trailing spaces, form feeds and long
//! runs of empty lines. Paragraph breaks (`"\n\n"`) are the chunker's coarsest
//! separator, so they are preserved while everything longer is collapsed.

use tracing::trace;

/// Normalize page text with minimal layout disruption.
///
/// - Drops control characters other than `\n` and `\t` (`\r` is removed).
/// - Trims trailing whitespace on each line.
/// - Collapses runs of blank lines into a single blank line.
/// - Trims leading and trailing blank lines of the page.
pub fn normalize_page_text(s: &str) -> String {
    trace!(target: "doc_rag::loader", input_len = s.len(), "normalize_page_text");

    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    let mut blank_run = 0usize;

    for line in cleaned.lines() {
        let line = line.trim_end();

        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }

        out.push_str(line);
        out.push('\n');
    }

    out.trim_end().to_string()
}

/// `true` when the text contains at least one non-whitespace character.
pub fn has_content(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_blank_runs_and_trailing_space() {
        let raw = "\n\nTitle   \n\n\n\nBody line\r\n  indented\t \n\n";
        assert_eq!(normalize_page_text(raw), "Title\n\nBody line\n  indented");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(normalize_page_text("a\u{0c}b\u{0}c"), "abc");
    }

    #[test]
    fn whitespace_only_has_no_content() {
        assert!(!has_content(" \n\t \n"));
        assert!(has_content(" x "));
        assert_eq!(normalize_page_text(" \n \n"), "");
    }
}
