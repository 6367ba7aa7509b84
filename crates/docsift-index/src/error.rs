//! Error types for docsift-index.

/// Errors surfaced by chunking, indexing, and retrieval.
///
/// Lookup misses and generation-backend failures are recovered inside
/// the engine (dropped candidates, extractive fallback) and never reach
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid chunking parameters or an embedding-dimension mismatch.
    /// Fatal; surfaced to the operator, never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The embedding call failed. Nothing was appended to the index.
    #[error("embedding failed: {0}")]
    Embedding(#[source] docsift_llm::LlmError),

    /// Durable save failed after an in-memory append. The index must be
    /// reopened before it can be trusted; retrying the `add` would
    /// duplicate entries.
    #[error("persistence failed: {0}")]
    Persistence(#[source] std::io::Error),

    /// Chunk store error.
    #[error("store error: {0}")]
    Store(#[from] docsift_store::StoreError),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
