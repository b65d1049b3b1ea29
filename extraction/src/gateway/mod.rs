//! LLM Gateway (C4) - provider-agnostic prompt/response calls with rate
//! limiting, deadlines, a fallback chain, and structured-output parsing.
//!
//! Mirrors [`crate::crawlers::rate_limited`]'s decorator shape: a trait for
//! the thing being rate-limited (here [`LlmClient`] instead of `Crawler`),
//! and a wrapper that acquires a token before delegating.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ExtractionError, Result};

/// Options for a single gateway call.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// When true, the response is expected to parse as JSON (after fence
    /// stripping); callers use [`parse_json_response`] on the result.
    pub expect_json: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
            expect_json: false,
        }
    }
}

impl CompletionOptions {
    pub fn json(timeout: Duration) -> Self {
        Self {
            expect_json: true,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }
}

/// A provider-agnostic LLM completion client.
///
/// Implementations wrap a specific vendor SDK. `complete` must not retry or
/// apply its own deadline beyond what `options.timeout` asks for; that
/// policy belongs to the gateway wrapper, not the provider adapter.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// Human-readable provider name, used in fallback-chain error messages.
    fn name(&self) -> &str;
}

/// Strip a common Markdown code-fence wrapper (```json ... ``` or ``` ... ```)
/// from an LLM response before parsing it as JSON.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a gateway response as JSON, stripping a code fence if present.
/// Parse errors are reported distinctly from transport/timeout errors.
pub fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let stripped = strip_json_fence(text);
    serde_json::from_str(stripped).map_err(ExtractionError::JsonParse)
}

/// Rate-limits and deadline-bounds calls to an inner [`LlmClient`].
///
/// Blocks until a token-bucket slot is available or `options.timeout`
/// elapses, whichever comes first - matching [`crate::crawlers::rate_limited::RateLimitedCrawler`]'s
/// "wait, don't retry" posture.
pub struct RateLimitedLlm<C: LlmClient> {
    inner: C,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl<C: LlmClient> RateLimitedLlm<C> {
    /// `requests_per_minute` defaults to 8 per the gateway's documented default.
    pub fn new(client: C, requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute.max(1)).unwrap();
        let quota = Quota::per_minute(rpm);
        Self {
            inner: client,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn wait_for_permit(&self, deadline: Duration) -> Result<()> {
        tokio::time::timeout(deadline, self.limiter.until_ready())
            .await
            .map_err(|_| ExtractionError::RateLimited)
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RateLimitedLlm<C> {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.wait_for_permit(options.timeout).await?;

        match tokio::time::timeout(options.timeout, self.inner.complete(prompt, options)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(options.timeout)),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Tries a primary provider, falling back to a secondary on timeout or
/// provider failure. The gateway - not any other component - owns this
/// selection policy.
pub struct ProviderChain {
    providers: Vec<Box<dyn LlmClient>>,
}

impl ProviderChain {
    pub fn new(primary: Box<dyn LlmClient>) -> Self {
        Self {
            providers: vec![primary],
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn LlmClient>) -> Self {
        self.providers.push(fallback);
        self
    }
}

#[async_trait]
impl LlmClient for ProviderChain {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.complete(prompt, options).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "LLM provider failed, trying fallback");
                    last_err = Some(e);
                }
            }
        }
        Err(ExtractionError::Provider(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no providers configured".to_string()),
        ))
    }

    fn name(&self) -> &str {
        "provider-chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct StaticClient {
        label: &'static str,
        response: Result<String>,
    }

    #[async_trait]
    impl LlmClient for StaticClient {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(ExtractionError::Provider("boom".to_string())),
            }
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    struct CountingClient {
        label: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmClient for CountingClient {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    #[test]
    fn test_strip_json_fence_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fence_bare() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fence_no_fence() {
        let text = "{\"a\": 1}";
        assert_eq!(strip_json_fence(text), "{\"a\": 1}");
    }

    #[derive(serde::Deserialize)]
    struct Sample {
        a: i32,
    }

    #[test]
    fn test_parse_json_response() {
        let parsed: Sample = parse_json_response("```json\n{\"a\": 7}\n```").unwrap();
        assert_eq!(parsed.a, 7);
    }

    #[tokio::test]
    async fn test_provider_chain_falls_back() {
        let primary = StaticClient {
            label: "primary",
            response: Err(ExtractionError::RateLimited),
        };
        let fallback = StaticClient {
            label: "fallback",
            response: Ok("fallback text".to_string()),
        };
        let chain = ProviderChain::new(Box::new(primary)).with_fallback(Box::new(fallback));

        let result = chain.complete("hi", &CompletionOptions::default()).await.unwrap();
        assert_eq!(result, "fallback text");
    }

    #[tokio::test]
    async fn test_provider_chain_all_fail() {
        let primary = StaticClient {
            label: "primary",
            response: Err(ExtractionError::RateLimited),
        };
        let chain = ProviderChain::new(Box::new(primary));
        let result = chain.complete("hi", &CompletionOptions::default()).await;
        assert!(matches!(result, Err(ExtractionError::Provider(_))));
    }

    #[tokio::test]
    async fn test_rate_limited_llm_spaces_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CountingClient {
            label: "test",
            calls: calls.clone(),
        };
        let limited = RateLimitedLlm::new(client, 120); // 2 rps equivalent

        let start = Instant::now();
        for _ in 0..3 {
            limited
                .complete("hi", &CompletionOptions::default().with_timeout(Duration::from_secs(5)))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Burst capacity is 1 at 120rpm -> expect some spacing, not a strict bound here.
        let _ = start.elapsed();
    }
}
