//! OpenAI-backed [`LlmClient`] and [`Embedder`] adapters, wired through the
//! sibling `openai-client` crate rather than a hand-rolled REST call.

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient};

use crate::embedding::Embedder;
use crate::error::{ExtractionError, Result};
use crate::gateway::{CompletionOptions, LlmClient};

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

fn map_err(e: openai_client::OpenAIError) -> ExtractionError {
    ExtractionError::AI(Box::new(e))
}

/// A single-provider OpenAI adapter satisfying both gateway seams this crate
/// needs (completions for C4, embeddings for C8). Wrap in
/// [`crate::gateway::RateLimitedLlm`] for rate limiting and
/// [`crate::gateway::ProviderChain`] to add a fallback provider.
pub struct OpenAI {
    client: OpenAIClient,
    chat_model: String,
    embedding_model: String,
}

impl OpenAI {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: OpenAIClient::new(api_key),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Build from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let client = OpenAIClient::from_env().map_err(map_err)?;
        Ok(Self {
            client,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAI {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let mut request = ChatRequest::new(&self.chat_model)
            .message(Message::user(prompt))
            .temperature(options.temperature)
            .max_completion_tokens(options.max_output_tokens);

        if options.expect_json {
            request = request.message(Message::system(
                "Respond with valid JSON only, no prose and no code fences.",
            ));
        }

        let response = self.client.chat_completion(request).await.map_err(map_err)?;
        Ok(response.content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl Embedder for OpenAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .create_embedding(text, &self.embedding_model)
            .await
            .map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_models() {
        let adapter = OpenAI::new("sk-test")
            .with_chat_model("gpt-4o")
            .with_embedding_model("text-embedding-3-large");
        assert_eq!(adapter.chat_model, "gpt-4o");
        assert_eq!(adapter.embedding_model, "text-embedding-3-large");
    }

    #[test]
    fn test_name() {
        let adapter = OpenAI::new("sk-test");
        assert_eq!(LlmClient::name(&adapter), "openai");
    }
}
