//! Ingestion pipeline: chunk pages, persist chunk text, index embeddings.

use std::sync::Arc;

use docsift_llm::LlmProvider;
use docsift_store::SqliteStore;
use docsift_store::types::ChunkRecord;

use crate::chunker::{ChunkerConfig, PageRecord, chunk_pages};
use crate::error::Result;
use crate::store::VectorIndex;

/// Summary of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks_created: usize,
}

/// Drives a document's pages through chunking, the chunk store, and the
/// vector index.
pub struct Ingestor<P> {
    store: Arc<SqliteStore>,
    index: Arc<VectorIndex<P>>,
    chunker: ChunkerConfig,
}

impl<P: LlmProvider + 'static> Ingestor<P> {
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, index: Arc<VectorIndex<P>>, chunker: ChunkerConfig) -> Self {
        Self {
            store,
            index,
            chunker,
        }
    }

    /// Chunk `pages`, persist the chunk text, and index embeddings
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns chunker configuration, store, embedding, or persistence
    /// errors. A failed embedding or persist leaves the chunk store
    /// committed but the vector index without the new entries.
    pub async fn ingest_pages(&self, document_id: &str, pages: &[PageRecord]) -> Result<IngestReport> {
        let records = self.prepare(document_id, pages)?;
        self.store.insert_chunks(&records).await?;
        self.index.add(&records).await?;
        Ok(IngestReport {
            pages: pages.len(),
            chunks_created: records.len(),
        })
    }

    /// Persist chunk text now and hand the embedding/index work to a
    /// spawned task, returning its handle.
    ///
    /// Queries issued before the handle resolves may not see the new
    /// chunks yet; that staleness window is bounded by the task's
    /// completion and is part of the ingest contract.
    ///
    /// # Errors
    ///
    /// Returns chunker configuration or store errors; indexing errors
    /// surface through the returned handle.
    pub async fn ingest_pages_deferred(
        &self,
        document_id: &str,
        pages: &[PageRecord],
    ) -> Result<(IngestReport, tokio::task::JoinHandle<Result<()>>)> {
        let records = self.prepare(document_id, pages)?;
        self.store.insert_chunks(&records).await?;
        let report = IngestReport {
            pages: pages.len(),
            chunks_created: records.len(),
        };

        let index = Arc::clone(&self.index);
        let handle = tokio::spawn(async move {
            index.add(&records).await.inspect_err(|e| {
                tracing::error!("deferred indexing failed: {e}");
            })
        });
        Ok((report, handle))
    }

    fn prepare(&self, document_id: &str, pages: &[PageRecord]) -> Result<Vec<ChunkRecord>> {
        let chunks = chunk_pages(pages, &self.chunker)?;
        Ok(chunks
            .into_iter()
            .map(|chunk| ChunkRecord {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: document_id.to_owned(),
                page_no: chunk.page_no,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                text: chunk.text,
            })
            .collect())
    }
}
