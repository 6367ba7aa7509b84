use std::future::Future;

use crate::error::LlmError;

pub trait LlmProvider: Send + Sync {
    /// Embed a batch of texts into fixed-dimension vectors, one per
    /// input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the
    /// response is invalid.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Generate a text completion for the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, unconfigured, or
    /// returns an empty response.
    fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Whether the completion backend is configured at all. Callers use
    /// this to skip the generation path entirely rather than probe it
    /// with a doomed request.
    fn supports_completions(&self) -> bool;

    fn name(&self) -> &'static str;
}
