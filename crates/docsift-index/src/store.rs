//! File-persisted vector index with ordinal-aligned chunk metadata.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use docsift_llm::LlmProvider;
use docsift_store::types::ChunkRecord;

use crate::error::{IndexError, Result};

/// Header prefix of the vector artifact.
const VEC_MAGIC: [u8; 4] = *b"DSIX";

/// Chunk descriptor at ordinal position `i`; describes the vector at
/// row `i` of the vector arena. The two sequences grow only in
/// lock-step and are never reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub document_id: String,
    pub page_no: u32,
    pub char_start: usize,
    pub char_end: usize,
}

impl ChunkMeta {
    fn from_record(record: &ChunkRecord) -> Self {
        Self {
            document_id: record.document_id.clone(),
            page_no: record.page_no,
            char_start: record.char_start,
            char_end: record.char_end,
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Candidates fetched per requested result before filtering.
    /// Bounds worst-case query cost: there is never a second fetch
    /// round when filtering starves the result set.
    pub overfetch: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { overfetch: 3 }
    }
}

struct IndexState {
    /// Flat row-major vector arena, `dim` floats per row.
    vectors: Vec<f32>,
    meta: Vec<ChunkMeta>,
}

impl IndexState {
    fn empty() -> Self {
        Self {
            vectors: Vec::new(),
            meta: Vec::new(),
        }
    }
}

/// Append-only semantic index over ingested chunks.
///
/// Exclusively owns both the in-memory vector/metadata sequences and
/// their on-disk artifacts (`index.vec` + `index.meta.json`, rewritten
/// as a unit after every append). `add` serializes against everything
/// else through the write lock; queries share a read lock and never
/// observe a half-appended state.
pub struct VectorIndex<P> {
    provider: Arc<P>,
    dim: usize,
    config: IndexConfig,
    vec_path: PathBuf,
    meta_path: PathBuf,
    state: RwLock<IndexState>,
}

impl<P: LlmProvider> VectorIndex<P> {
    /// Open the index in `dir`, probing the embedding model for its
    /// vector dimension and reloading any persisted artifacts.
    ///
    /// A corrupt, truncated, or mismatched pair of artifacts is
    /// discarded with a warning; a bad reload never prevents startup,
    /// it only forfeits the previously indexed content.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Embedding` if the dimension probe fails, or
    /// `IndexError::Config` if the model reports an unusable dimension.
    pub async fn open(dir: &Path, provider: Arc<P>, config: IndexConfig) -> Result<Self> {
        let probe = provider
            .embed_batch(&["dimension probe".to_owned()])
            .await
            .map_err(IndexError::Embedding)?;
        let dim = probe.first().map(Vec::len).unwrap_or_default();
        if dim == 0 || u32::try_from(dim).is_err() {
            return Err(IndexError::Config(format!(
                "embedding model reported unusable dimension {dim}"
            )));
        }

        let vec_path = dir.join("index.vec");
        let meta_path = dir.join("index.meta.json");

        let state = if vec_path.exists() && meta_path.exists() {
            match load_artifacts(&vec_path, &meta_path, dim) {
                Ok(state) => {
                    tracing::info!(vectors = state.meta.len(), "loaded vector index");
                    state
                }
                Err(e) => {
                    tracing::warn!("discarding vector index, starting empty: {e}");
                    IndexState::empty()
                }
            }
        } else {
            IndexState::empty()
        };

        Ok(Self {
            provider,
            dim,
            config,
            vec_path,
            meta_path,
            state: RwLock::new(state),
        })
    }

    /// Embedding dimension, fixed at open.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed chunks.
    pub async fn len(&self) -> usize {
        self.state.read().await.meta.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embed `chunks` in one batched call, append vectors and metadata
    /// in lock-step, then rewrite both artifacts.
    ///
    /// On embedding failure nothing is appended. On persist failure the
    /// in-memory append stays in place and disk is stale; the caller
    /// must reopen the index rather than retry, since a retry would
    /// duplicate entries.
    ///
    /// # Errors
    ///
    /// `IndexError::Embedding`, `IndexError::Config` (vector count or
    /// dimension mismatch from the provider), or
    /// `IndexError::Persistence`.
    pub async fn add(&self, chunks: &[ChunkRecord]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = self
            .provider
            .embed_batch(&texts)
            .await
            .map_err(IndexError::Embedding)?;

        if embedded.len() != chunks.len() {
            return Err(IndexError::Config(format!(
                "embedding model returned {} vectors for {} chunks",
                embedded.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = embedded.iter().find(|v| v.len() != self.dim) {
            return Err(IndexError::Config(format!(
                "embedding dimension {} does not match index dimension {}",
                bad.len(),
                self.dim
            )));
        }

        let mut state = self.state.write().await;
        for (chunk, vector) in chunks.iter().zip(&embedded) {
            state.vectors.extend_from_slice(vector);
            state.meta.push(ChunkMeta::from_record(chunk));
        }
        self.persist(&state)?;

        tracing::debug!(added = chunks.len(), total = state.meta.len(), "indexed chunks");
        Ok(())
    }

    /// Nearest-neighbor lookup, ascending L2 distance.
    ///
    /// Fetches `top_k * overfetch` candidates, then keeps at most
    /// `top_k` that survive the ordinal-range guard and the optional
    /// document filter, in distance order. When filtering starves the
    /// candidate list, fewer than `top_k` results are returned; no
    /// second fetch round is attempted.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Config` for `top_k == 0` or a query vector
    /// whose dimension differs from the index's.
    pub async fn query(
        &self,
        query_vec: &[f32],
        top_k: usize,
        document_filter: Option<&HashSet<String>>,
    ) -> Result<Vec<ChunkMeta>> {
        if top_k == 0 {
            return Err(IndexError::Config("top_k must be positive".into()));
        }
        if query_vec.len() != self.dim {
            return Err(IndexError::Config(format!(
                "query dimension {} does not match index dimension {}",
                query_vec.len(),
                self.dim
            )));
        }

        let state = self.state.read().await;
        let rows = state.vectors.len() / self.dim;

        let mut candidates: Vec<(usize, f32)> = (0..rows)
            .map(|i| {
                let row = &state.vectors[i * self.dim..(i + 1) * self.dim];
                (i, squared_l2(query_vec, row))
            })
            .collect();
        candidates.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k.saturating_mul(self.config.overfetch));

        let mut hits = Vec::new();
        for (ordinal, _) in candidates {
            // Guard against stale ordinals from a mismatched reload.
            let Some(meta) = state.meta.get(ordinal) else {
                continue;
            };
            if let Some(filter) = document_filter
                && !filter.contains(&meta.document_id)
            {
                continue;
            }
            hits.push(meta.clone());
            if hits.len() >= top_k {
                break;
            }
        }
        Ok(hits)
    }

    fn persist(&self, state: &IndexState) -> Result<()> {
        let encoded = encode_vectors(self.dim, &state.vectors);
        write_atomic(&self.vec_path, &encoded).map_err(IndexError::Persistence)?;

        let meta_json = serde_json::to_vec(&state.meta)
            .map_err(|e| IndexError::Persistence(std::io::Error::other(e)))?;
        write_atomic(&self.meta_path, &meta_json).map_err(IndexError::Persistence)?;
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Write to a temp sibling, fsync, then rename over the target so a
/// crash never leaves a half-written artifact observable at reload.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

fn encode_vectors(dim: usize, vectors: &[f32]) -> Vec<u8> {
    let rows = vectors.len() / dim;
    let mut out = Vec::with_capacity(16 + vectors.len() * 4);
    out.extend_from_slice(&VEC_MAGIC);
    out.extend_from_slice(&u32::try_from(dim).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(&u64::try_from(rows).unwrap_or(u64::MAX).to_le_bytes());
    for value in vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn invalid(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

fn load_artifacts(vec_path: &Path, meta_path: &Path, dim: usize) -> std::io::Result<IndexState> {
    let raw = std::fs::read(vec_path)?;
    let vectors = decode_vectors(&raw, dim)?;

    let meta_bytes = std::fs::read(meta_path)?;
    let meta: Vec<ChunkMeta> = serde_json::from_slice(&meta_bytes)
        .map_err(|e| invalid(format!("metadata artifact: {e}")))?;

    let rows = vectors.len() / dim;
    if meta.len() != rows {
        return Err(invalid(format!(
            "artifact length mismatch: {} metadata records for {rows} vectors",
            meta.len()
        )));
    }

    Ok(IndexState { vectors, meta })
}

fn decode_vectors(raw: &[u8], dim: usize) -> std::io::Result<Vec<f32>> {
    if raw.len() < 16 || raw[..4] != VEC_MAGIC {
        return Err(invalid("bad vector artifact header".into()));
    }

    let stored_dim = raw[4..8]
        .try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| invalid("bad vector artifact header".into()))?;
    if stored_dim as usize != dim {
        return Err(invalid(format!(
            "vector artifact dimension {stored_dim} does not match model dimension {dim}"
        )));
    }

    let rows = raw[8..16]
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(|_| invalid("bad vector artifact header".into()))?;
    let rows = usize::try_from(rows).map_err(|_| invalid("vector artifact row count".into()))?;

    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| invalid("vector artifact row count".into()))?;
    let body = &raw[16..];
    if body.len() != expected {
        return Err(invalid(format!(
            "vector artifact truncated: {} bytes, expected {expected}",
            body.len()
        )));
    }

    let mut vectors = Vec::with_capacity(rows * dim);
    for chunk in body.chunks_exact(4) {
        let bytes: [u8; 4] = chunk
            .try_into()
            .map_err(|_| invalid("vector artifact truncated".into()))?;
        vectors.push(f32::from_le_bytes(bytes));
    }
    Ok(vectors)
}
