//! Page extraction: turn source files into offset-tracked page records.

use docsift_index::chunker::PageRecord;

/// Split raw text into pages on form feeds, tracking character offsets
/// over the concatenated text. Input without form feeds becomes a
/// single page.
#[must_use]
pub fn pages_from_text(text: &str) -> Vec<PageRecord> {
    let mut pages = Vec::new();
    let mut cursor = 0usize;
    for (i, part) in text.split('\u{c}').enumerate() {
        let len = part.chars().count();
        pages.push(PageRecord {
            page_no: u32::try_from(i + 1).unwrap_or(u32::MAX),
            char_start: cursor,
            char_end: cursor + len,
            text: part.to_owned(),
        });
        cursor += len;
    }
    pages
}

/// Extract page records from a PDF. Page breaks survive as form feeds
/// where the extractor emits them; otherwise the document is one page.
#[cfg(feature = "pdf")]
pub async fn pages_from_pdf(path: &std::path::Path) -> anyhow::Result<Vec<PageRecord>> {
    let path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await??;
    Ok(pages_from_text(&text))
}
