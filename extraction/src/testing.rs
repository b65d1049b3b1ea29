//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real LLM or network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::embedding::Embedder;
use crate::error::{CrawlError, CrawlResult, Result};
use crate::gateway::{CompletionOptions, LlmClient};
use crate::traits::crawler::Crawler;
use crate::types::{config::CrawlConfig, page::CrawledPage};

/// A mock LLM client for testing, backing both [`LlmClient`] (C4) and
/// [`Embedder`] (C8) with deterministic, configurable responses.
#[derive(Default)]
pub struct MockLlm {
    /// Canned response keyed by a substring of the prompt; first match wins.
    responses: Arc<RwLock<Vec<(String, String)>>>,

    /// Response returned when no keyed response matches.
    default_response: Arc<RwLock<Option<String>>>,

    /// Predefined embeddings by text.
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,

    /// Default embedding dimension for generated (non-predefined) embeddings.
    embedding_dim: usize,

    /// Call tracking for assertions.
    calls: Arc<RwLock<Vec<MockLlmCall>>>,
}

/// Record of a call made to the mock LLM.
#[derive(Debug, Clone)]
pub enum MockLlmCall {
    Complete { prompt_len: usize, expect_json: bool },
    Embed { text_len: usize },
}

impl MockLlm {
    /// Create a new mock LLM that echoes an empty JSON object by default.
    pub fn new() -> Self {
        Self {
            embedding_dim: 8,
            default_response: Arc::new(RwLock::new(Some("{}".to_string()))),
            ..Default::default()
        }
    }

    /// Always return this response regardless of prompt.
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.write().unwrap() = Some(response.into());
        self
    }

    /// Return `response` whenever the prompt contains `matches_substring`.
    /// Earlier registrations take priority over later ones.
    pub fn with_response(self, matches_substring: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.write().unwrap().push((matches_substring.into(), response.into()));
        self
    }

    /// Set the dimension used for generated (non-predefined) embeddings.
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Add a predefined embedding for an exact text match.
    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings.write().unwrap().insert(text.into(), embedding);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockLlmCall> {
        self.calls.read().unwrap().clone()
    }

    /// Generate a deterministic embedding based on text content.
    fn generate_deterministic_embedding(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        (0..self.embedding_dim)
            .map(|i| {
                let byte = hash[i % 32] as f32;
                (byte / 127.5) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.calls.write().unwrap().push(MockLlmCall::Complete {
            prompt_len: prompt.len(),
            expect_json: options.expect_json,
        });

        for (needle, response) in self.responses.read().unwrap().iter() {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }

        Ok(self
            .default_response
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "{}".to_string()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl Embedder for MockLlm {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.write().unwrap().push(MockLlmCall::Embed { text_len: text.len() });

        Ok(self
            .embeddings
            .read()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.generate_deterministic_embedding(text)))
    }
}

/// A mock crawler for testing.
///
/// Returns predefined pages without making network requests.
#[derive(Default)]
pub struct MockCrawler {
    /// Predefined pages by URL
    pages: Arc<RwLock<HashMap<String, CrawledPage>>>,

    /// URLs that should fail
    fail_urls: Arc<RwLock<Vec<String>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockCrawlerCall>>>,
}

/// Record of a call made to the mock crawler.
#[derive(Debug, Clone)]
pub enum MockCrawlerCall {
    Crawl { url: String, max_pages: usize },
    Fetch { url: String },
}

impl MockCrawler {
    /// Create a new mock crawler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined page.
    pub fn with_page(self, page: CrawledPage) -> Self {
        self.pages.write().unwrap().insert(page.url.clone(), page);
        self
    }

    /// Add multiple predefined pages.
    pub fn with_pages(self, pages: impl IntoIterator<Item = CrawledPage>) -> Self {
        let mut store = self.pages.write().unwrap();
        for page in pages {
            store.insert(page.url.clone(), page);
        }
        drop(store);
        self
    }

    /// Mark a URL as failing.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap().push(url.into());
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCrawlerCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn crawl(&self, config: &CrawlConfig) -> CrawlResult<Vec<CrawledPage>> {
        self.calls.write().unwrap().push(MockCrawlerCall::Crawl {
            url: config.url.clone(),
            max_pages: config.max_pages,
        });

        // Check if should fail
        if self.fail_urls.read().unwrap().contains(&config.url) {
            return Err(CrawlError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        // Return pages matching the site URL prefix
        let pages: Vec<_> = self
            .pages
            .read()
            .unwrap()
            .values()
            .filter(|p| p.url.starts_with(&config.url))
            .take(config.max_pages)
            .cloned()
            .collect();

        Ok(pages)
    }

    async fn fetch(&self, url: &str) -> CrawlResult<CrawledPage> {
        self.calls
            .write()
            .unwrap()
            .push(MockCrawlerCall::Fetch { url: url.to_string() });

        // Check if should fail
        if self.fail_urls.read().unwrap().contains(&url.to_string()) {
            return Err(CrawlError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        // Return predefined page or error
        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlError::InvalidUrl { url: url.to_string() })
    }
}

/// Builder for creating test scenarios: a fixture site served by a
/// [`MockCrawler`] paired with a [`MockLlm`] standing in for C4/C8.
pub struct TestScenario {
    llm: MockLlm,
    crawler: MockCrawler,
}

impl TestScenario {
    /// Create a new test scenario.
    pub fn new() -> Self {
        Self {
            llm: MockLlm::new(),
            crawler: MockCrawler::new(),
        }
    }

    /// Add a site with pages.
    pub fn with_site(mut self, site_url: &str, pages: Vec<(&str, &str)>) -> Self {
        for (path, content) in pages {
            let url = format!("{}{}", site_url, path);
            let page = CrawledPage::new(&url, content).with_title(path);
            self.crawler = self.crawler.with_page(page);
        }
        self
    }

    /// Configure the LLM's default completion response.
    pub fn with_llm_response(mut self, response: impl Into<String>) -> Self {
        self.llm = self.llm.with_default_response(response);
        self
    }

    /// Get the mock LLM.
    pub fn llm(self) -> MockLlm {
        self.llm
    }

    /// Get the mock crawler.
    pub fn crawler(self) -> MockCrawler {
        self.crawler
    }

    /// Get both mocks.
    pub fn build(self) -> (MockLlm, MockCrawler) {
        (self.llm, self.crawler)
    }
}

impl Default for TestScenario {
    fn default() -> Self {
        Self::new()
    }
}
