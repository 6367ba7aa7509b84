/// A registered source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub num_pages: u32,
}

/// One indexed unit of page text. Offsets are absolute character
/// positions in the document's concatenated full text; `char_end -
/// char_start` always equals the character length of `text`. Chunks are
/// immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub page_no: u32,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}
