//! Question answering over the vector index: retrieve, ground, cite.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use docsift_llm::LlmProvider;
use docsift_store::{SqliteStore, StoreError};

use crate::error::{IndexError, Result};
use crate::store::{ChunkMeta, VectorIndex};

/// Answer returned when retrieval (or resolution) yields nothing. A
/// normal outcome, not a failure.
pub const NO_RELEVANT_CONTENT: &str = "No relevant content found";

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("static word pattern"));

/// Resolves a retrieved stub to its stored chunk text.
///
/// The vector index only keeps `(document, page, span)` stubs; full
/// text lives in the relational chunk store behind this seam.
pub trait ChunkSource: Send + Sync {
    fn lookup(
        &self,
        document_id: &str,
        page_no: u32,
    ) -> impl Future<Output = std::result::Result<Option<String>, StoreError>> + Send;
}

impl ChunkSource for SqliteStore {
    async fn lookup(
        &self,
        document_id: &str,
        page_no: u32,
    ) -> std::result::Result<Option<String>, StoreError> {
        self.chunk_text(document_id, page_no).await
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sentences concatenated by the extractive fallback.
    pub fallback_sentences: usize,
    /// Characters of chunk text quoted in a citation snippet.
    pub snippet_chars: usize,
    /// Characters of chunk text fed into the prompt context.
    pub context_chars: usize,
    /// Characters of the top chunk returned when no sentence scores.
    pub fallback_answer_chars: usize,
    /// Token budget for the generation backend.
    pub max_tokens: u32,
    pub temperature: f32,
    /// A backend call slower than this is treated as unavailable.
    pub backend_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_sentences: 5,
            snippet_chars: 250,
            context_chars: 3000,
            fallback_answer_chars: 500,
            max_tokens: 500,
            temperature: 0.0,
            backend_timeout: Duration::from_secs(30),
        }
    }
}

/// A cited span of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub page_no: u32,
    pub char_start: usize,
    pub char_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Answer plus the document spans that ground it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// Shape expected back from the generation backend. Anything that
/// fails to decode into this routes to the extractive fallback.
#[derive(Debug, Deserialize)]
struct BackendAnswer {
    answer: String,
    #[serde(default)]
    citations: Option<Vec<BackendCitation>>,
}

#[derive(Debug, Deserialize)]
struct BackendCitation {
    document_id: String,
    page_no: u32,
    #[serde(default)]
    snippet: Option<String>,
}

struct ResolvedChunk {
    meta: ChunkMeta,
    text: String,
}

/// Turns a question into a grounded answer with citations.
pub struct RagEngine<P, S> {
    provider: Arc<P>,
    index: Arc<VectorIndex<P>>,
    chunk_source: S,
    config: EngineConfig,
}

impl<P: LlmProvider, S: ChunkSource> RagEngine<P, S> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        index: Arc<VectorIndex<P>>,
        chunk_source: S,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            index,
            chunk_source,
            config,
        }
    }

    /// Answer `question` from indexed content.
    ///
    /// Retrieval stubs whose chunk text cannot be resolved are dropped;
    /// a missing or misbehaving generation backend degrades to the
    /// extractive fallback. Citations always come from the retrieved
    /// metadata, whichever answering path ran.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Embedding` if the question cannot be
    /// embedded, or `IndexError::Config` for an embedding-dimension
    /// mismatch or invalid `top_k`.
    pub async fn answer(
        &self,
        question: &str,
        document_filter: Option<&HashSet<String>>,
        top_k: usize,
    ) -> Result<GroundedAnswer> {
        let embedded = self
            .provider
            .embed_batch(&[question.to_owned()])
            .await
            .map_err(IndexError::Embedding)?;
        let query_vec = embedded
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Config("embedding model returned no query vector".into()))?;
        if query_vec.len() != self.index.dim() {
            return Err(IndexError::Config(format!(
                "query embedding dimension {} does not match index dimension {}",
                query_vec.len(),
                self.index.dim()
            )));
        }

        let retrieved = self.index.query(&query_vec, top_k, document_filter).await?;
        if retrieved.is_empty() {
            return Ok(GroundedAnswer {
                answer: NO_RELEVANT_CONTENT.to_owned(),
                citations: Vec::new(),
            });
        }

        let resolved = self.resolve(&retrieved).await;
        if resolved.is_empty() {
            return Ok(GroundedAnswer {
                answer: NO_RELEVANT_CONTENT.to_owned(),
                citations: Vec::new(),
            });
        }

        let citations = derive_citations(&resolved, self.config.snippet_chars);

        match self.generate(question, &resolved).await {
            Ok(parsed) => {
                let citations = parsed
                    .citations
                    .and_then(|list| align_backend_citations(&list, &resolved))
                    .unwrap_or(citations);
                Ok(GroundedAnswer {
                    answer: parsed.answer,
                    citations,
                })
            }
            Err(reason) => {
                tracing::warn!("generation backend degraded, extractive fallback: {reason}");
                Ok(GroundedAnswer {
                    answer: self.extractive_answer(question, &resolved),
                    citations,
                })
            }
        }
    }

    async fn resolve(&self, retrieved: &[ChunkMeta]) -> Vec<ResolvedChunk> {
        let mut resolved = Vec::with_capacity(retrieved.len());
        for meta in retrieved {
            match self
                .chunk_source
                .lookup(&meta.document_id, meta.page_no)
                .await
            {
                Ok(Some(text)) => resolved.push(ResolvedChunk {
                    meta: meta.clone(),
                    text: clip_chars(&text, self.config.context_chars),
                }),
                Ok(None) => tracing::debug!(
                    document = %meta.document_id,
                    page = meta.page_no,
                    "retrieved chunk missing from store, dropped"
                ),
                Err(e) => tracing::debug!(
                    document = %meta.document_id,
                    page = meta.page_no,
                    "chunk lookup failed, dropped: {e}"
                ),
            }
        }
        resolved
    }

    /// Run the generation backend; the `Err` reason routes to the
    /// extractive fallback and is never surfaced to the caller.
    async fn generate(
        &self,
        question: &str,
        resolved: &[ResolvedChunk],
    ) -> std::result::Result<BackendAnswer, String> {
        if !self.provider.supports_completions() {
            return Err("completions not configured".into());
        }

        let prompt = build_prompt(question, resolved);
        let call = self
            .provider
            .complete(&prompt, self.config.max_tokens, self.config.temperature);
        let raw = match tokio::time::timeout(self.config.backend_timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(format!("backend error: {e}")),
            Err(_) => return Err("backend timed out".into()),
        };

        parse_backend_output(&raw).ok_or_else(|| "unparseable backend output".into())
    }

    fn extractive_answer(&self, question: &str, resolved: &[ResolvedChunk]) -> String {
        let question_tokens = word_tokens(question);

        // (score, retrieval rank, sentence position, sentence)
        let mut scored: Vec<(usize, usize, usize, &str)> = Vec::new();
        for (rank, chunk) in resolved.iter().enumerate() {
            for (position, sentence) in split_sentences(&chunk.text).into_iter().enumerate() {
                let score = word_tokens(sentence)
                    .intersection(&question_tokens)
                    .count();
                if score > 0 {
                    scored.push((score, rank, position, sentence));
                }
            }
        }

        if scored.is_empty() {
            let top = clip_chars(&resolved[0].text, self.config.fallback_answer_chars);
            return format!("{top}...");
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        scored
            .iter()
            .take(self.config.fallback_sentences)
            .map(|(_, _, _, sentence)| *sentence)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn derive_citations(resolved: &[ResolvedChunk], snippet_chars: usize) -> Vec<Citation> {
    resolved
        .iter()
        .map(|chunk| Citation {
            document_id: chunk.meta.document_id.clone(),
            page_no: chunk.meta.page_no,
            char_start: chunk.meta.char_start,
            char_end: chunk.meta.char_end,
            snippet: Some(clip_chars(&chunk.text, snippet_chars)),
        })
        .collect()
}

/// Map backend-supplied citations onto retrieved metadata to recover
/// character spans. `None` when the list is empty or any entry fails to
/// match a retrieved record, in which case the retrieval-derived list
/// is used instead.
fn align_backend_citations(
    list: &[BackendCitation],
    resolved: &[ResolvedChunk],
) -> Option<Vec<Citation>> {
    if list.is_empty() {
        return None;
    }
    list.iter()
        .map(|cited| {
            resolved
                .iter()
                .find(|chunk| {
                    chunk.meta.document_id == cited.document_id
                        && chunk.meta.page_no == cited.page_no
                })
                .map(|chunk| Citation {
                    document_id: chunk.meta.document_id.clone(),
                    page_no: chunk.meta.page_no,
                    char_start: chunk.meta.char_start,
                    char_end: chunk.meta.char_end,
                    snippet: cited.snippet.clone(),
                })
        })
        .collect()
}

fn build_prompt(question: &str, resolved: &[ResolvedChunk]) -> String {
    use std::fmt::Write;

    let mut context = String::new();
    for chunk in resolved {
        let _ = writeln!(
            context,
            "[Document: {} | Page: {}]",
            chunk.meta.document_id, chunk.meta.page_no
        );
        context.push_str(&chunk.text);
        context.push_str("\n---\n");
    }

    format!(
        "Answer strictly using ONLY the context below. Cite the document id and page \
         for every claim. Do not invent information. If the answer is missing from the \
         context, respond: \"The document does not contain this information.\"\n\n\
         QUESTION:\n{question}\n\nCONTEXT:\n{context}\n\
         Return valid JSON exactly like this:\n\
         {{\"answer\": \"<concise text answer>\", \
         \"citations\": [{{\"document_id\": \"...\", \"page_no\": 1, \"snippet\": \"...\"}}]}}"
    )
}

fn parse_backend_output(raw: &str) -> Option<BackendAnswer> {
    serde_json::from_str(strip_code_fence(raw)).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

fn word_tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_owned())
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn clip_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
