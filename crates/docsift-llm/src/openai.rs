//! OpenAI-compatible chat-completion and embedding backend.
//!
//! Works against api.openai.com or any server speaking the same HTTP
//! surface (`/v1/embeddings`, `/v1/chat/completions`).

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::LlmProvider;
use crate::retry::send_with_retry;

const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    max_retries: u32,
}

impl OpenAiProvider {
    /// Create a provider for the given endpoint. Without an API key the
    /// embedding endpoint is still usable (local servers accept
    /// unauthenticated requests) but completions report themselves as
    /// unconfigured.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: model.into(),
            embedding_model: embedding_model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl LlmProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let response = send_with_retry("openai", self.max_retries, || {
            self.auth(self.client.post(&url)).json(&body).send()
        })
        .await?;

        let parsed: EmbeddingResponse = response.error_for_status()?.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(LlmError::Other(format!(
                "embedding count mismatch: requested {}, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // Servers may return rows out of order; `index` is authoritative.
        let mut rows = parsed.data;
        rows.sort_unstable_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        if self.api_key.is_none() {
            return Err(LlmError::Unavailable);
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        let response = send_with_retry("openai", self.max_retries, || {
            self.auth(self.client.post(&url)).json(&body).send()
        })
        .await?;

        let parsed: ChatResponse = response.error_for_status()?.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_owned())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "openai" });
        }
        Ok(content)
    }

    fn supports_completions(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embed_batch_orders_rows_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(server.uri(), None, "gpt-4o-mini", "embed-small");
        let out = provider
            .embed_batch(&["first".into(), "second".into()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_batch_empty_input_skips_request() {
        let provider = OpenAiProvider::new("http://127.0.0.1:1", None, "m", "e");
        let out = provider.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn embed_batch_count_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(server.uri(), None, "m", "e");
        let result = provider.embed_batch(&["a".into(), "b".into()]).await;
        assert!(matches!(result, Err(LlmError::Other(_))));
    }

    #[tokio::test]
    async fn embed_batch_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.5, 0.5]}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(server.uri(), None, "m", "e");
        let out = provider.embed_batch(&["text".into()]).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn complete_without_api_key_is_unavailable() {
        let provider = OpenAiProvider::new("http://127.0.0.1:1", None, "m", "e");
        assert!(!provider.supports_completions());
        let result = provider.complete("prompt", 100, 0.0).await;
        assert!(matches!(result, Err(LlmError::Unavailable)));
    }

    #[tokio::test]
    async fn complete_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "  an answer  "}}]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAiProvider::new(server.uri(), Some("sk-test".into()), "gpt-4o-mini", "e");
        assert!(provider.supports_completions());
        let out = provider.complete("question", 100, 0.0).await.unwrap();
        assert_eq!(out, "an answer");
    }

    #[tokio::test]
    async fn complete_empty_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(server.uri(), Some("k".into()), "m", "e");
        let result = provider.complete("q", 100, 0.0).await;
        assert!(matches!(
            result,
            Err(LlmError::EmptyResponse { provider: "openai" })
        ));
    }

    #[test]
    fn trailing_slash_stripped_from_base_url() {
        let provider = OpenAiProvider::new("http://localhost:8080/", None, "m", "e");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }
}
