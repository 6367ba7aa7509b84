//! Sliding-window chunking over page text with absolute character provenance.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// One page of extracted document text. Offsets are absolute character
/// positions in the document's concatenated full text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_no: u32,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// A window of page text; offsets are absolute like the page's, so a
/// chunk can always be traced back to the exact characters it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    pub page_no: u32,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window width in characters (default: 1000).
    pub max_chars: usize,
    /// Characters shared between consecutive windows (default: 200).
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `IndexError::Config` when the parameters would prevent
    /// the window from advancing.
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(IndexError::Config("max_chars must be positive".into()));
        }
        if self.overlap >= self.max_chars {
            return Err(IndexError::Config(format!(
                "overlap {} must be smaller than max_chars {}",
                self.overlap, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Split pages into windows of at most `max_chars` characters, in page
/// order.
///
/// Pages that fit in one window (including empty pages) become a single
/// chunk spanning the page's recorded offsets. Longer pages are cut
/// into overlapping windows; the final window is truncated to end
/// exactly at the page text's end and emitted even when short.
/// Concatenating the emitted spans per page, minus the overlapped
/// regions, reconstructs the page text exactly.
///
/// # Errors
///
/// Returns `IndexError::Config` for invalid `max_chars`/`overlap`.
pub fn chunk_pages(pages: &[PageRecord], config: &ChunkerConfig) -> Result<Vec<PageChunk>> {
    config.validate()?;

    let mut out = Vec::new();
    for page in pages {
        chunk_page(page, config, &mut out);
    }
    Ok(out)
}

fn chunk_page(page: &PageRecord, config: &ChunkerConfig, out: &mut Vec<PageChunk>) {
    let chars: Vec<char> = page.text.chars().collect();

    if chars.len() <= config.max_chars {
        // Covers the empty page too: one chunk per page is the lower bound.
        out.push(PageChunk {
            page_no: page.page_no,
            char_start: page.char_start,
            char_end: page.char_end,
            text: page.text.clone(),
        });
        return;
    }

    let mut start = 0usize;
    loop {
        let end = (start + config.max_chars).min(chars.len());
        out.push(PageChunk {
            page_no: page.page_no,
            char_start: page.char_start + start,
            char_end: page.char_start + end,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start = end - config.overlap;
    }
}
