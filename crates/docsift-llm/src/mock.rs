//! Test-only mock provider with deterministic embeddings.

use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::LlmProvider;

/// Deterministic embedding: lowercase word tokens hashed into `dim`
/// buckets, L2-normalized. Texts sharing tokens land close together,
/// which is enough geometry for retrieval tests.
#[must_use]
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    use std::hash::{Hash, Hasher};

    let mut vector = vec![0.0f32; dim];
    let lower = text.to_lowercase();
    for token in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        #[expect(clippy::cast_possible_truncation)]
        let bucket = (hasher.finish() as usize) % dim;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dim: usize,
    pub completions_enabled: bool,
    pub fail_complete: bool,
    pub fail_embed: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock completion".into(),
            dim: 8,
            completions_enabled: true,
            fail_complete: false,
            fail_embed: false,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripted completions, returned in order; falls back to
    /// `default_response` when the script runs out.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Provider embedding into `dim`-dimensional space.
    #[must_use]
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Provider with no completion backend configured.
    #[must_use]
    pub fn without_completions() -> Self {
        Self {
            completions_enabled: false,
            ..Self::default()
        }
    }

    /// Provider whose completion calls error out.
    #[must_use]
    pub fn failing_completions() -> Self {
        Self {
            fail_complete: true,
            ..Self::default()
        }
    }

    /// Provider whose embedding calls error out.
    #[must_use]
    pub fn failing_embeddings() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }
}

impl LlmProvider for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding failure".into()));
        }
        Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
    }

    async fn complete(
        &self,
        _prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        if !self.completions_enabled {
            return Err(LlmError::Unavailable);
        }
        if self.fail_complete {
            return Err(LlmError::Other("mock completion failure".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    fn supports_completions(&self) -> bool {
        self.completions_enabled
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embed_deterministic() {
        assert_eq!(hash_embed("hello world", 8), hash_embed("hello world", 8));
    }

    #[test]
    fn hash_embed_normalized() {
        let v = hash_embed("some words here", 8);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embed_empty_text_is_zero_vector() {
        assert_eq!(hash_embed("", 4), vec![0.0; 4]);
    }

    #[test]
    fn shared_tokens_are_closer_than_disjoint() {
        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        let query = hash_embed("termination notice period", 8);
        let near = hash_embed("terminate with notice", 8);
        let far = hash_embed("quarterly revenue figures", 8);
        assert!(dot(&query, &near) >= dot(&query, &far));
    }

    #[tokio::test]
    async fn embed_batch_one_vector_per_text() {
        let provider = MockProvider::new();
        let out = provider
            .embed_batch(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn scripted_responses_in_order() {
        let provider = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(provider.complete("p", 10, 0.0).await.unwrap(), "one");
        assert_eq!(provider.complete("p", 10, 0.0).await.unwrap(), "two");
        assert_eq!(
            provider.complete("p", 10, 0.0).await.unwrap(),
            "mock completion"
        );
    }

    #[tokio::test]
    async fn without_completions_is_unavailable() {
        let provider = MockProvider::without_completions();
        assert!(!provider.supports_completions());
        assert!(matches!(
            provider.complete("p", 10, 0.0).await,
            Err(LlmError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn failing_embeddings_error() {
        let provider = MockProvider::failing_embeddings();
        assert!(provider.embed_batch(&["x".into()]).await.is_err());
    }
}
