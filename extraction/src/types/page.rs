//! Page types - crawled and extracted page content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A page that was crawled (before caching).
#[derive(Debug, Clone)]
pub struct CrawledPage {
    /// URL that was crawled
    pub url: String,

    /// Raw content (usually HTML converted to markdown)
    pub content: String,

    /// Page title if available
    pub title: Option<String>,

    /// HTTP status code
    pub status_code: u16,

    /// HTTP headers
    pub headers: HashMap<String, String>,
}

impl CrawledPage {
    /// Create a new crawled page.
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            title: None,
            status_code: 200,
            headers: HashMap::new(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// The kind of body a [`PageContent`] carries.
///
/// Aggregation never mixes kinds within a section: a consumer picks the
/// kind it wants and reads only sections tagged with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Nav/script/style stripped HTML, focused on the main content region.
    CleanedHtml,
    /// Markdown rendered from HTML (used when a cleaned-HTML pass isn't available).
    Markdown,
    /// Plain extracted text, the last-resort rendering.
    ExtractedText,
    /// No usable content was obtained; `body` is empty and `error` is set.
    Empty,
}

/// The output of fetching and cleaning a single URL.
///
/// Produced by the extractor (C6) and consumed by the aggregator (C7).
/// Failed fetches are represented as a value with `content_kind = Empty`
/// rather than as an error, so a batch of fetches always has one
/// `PageContent` per input URL, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    /// URL that was fetched.
    pub url: String,

    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,

    /// HTTP status code, if the transport layer got a response at all.
    pub http_status: Option<u16>,

    /// What kind of text `body` holds.
    pub content_kind: ContentKind,

    /// The cleaned body, truncated to at most 10,000 characters. Empty iff
    /// `content_kind == Empty`.
    pub body: String,

    /// Size of `body` in bytes.
    pub byte_size: usize,

    /// Human-readable failure reason, set iff `content_kind == Empty`.
    pub error: Option<String>,
}

/// Hard cap on a single page's cleaned body, in characters.
pub const MAX_BODY_CHARS: usize = 10_000;

/// Minimum number of whitespace-separated words a body must contain to be
/// considered non-empty content rather than a skeleton/placeholder page.
pub const MIN_CONTENT_WORDS: usize = 10;

impl PageContent {
    /// Build a successful `PageContent`, truncating the body to the hard cap.
    pub fn new(url: impl Into<String>, content_kind: ContentKind, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.chars().count() > MAX_BODY_CHARS {
            body = body.chars().take(MAX_BODY_CHARS).collect();
        }
        let byte_size = body.len();
        Self {
            url: url.into(),
            fetched_at: Utc::now(),
            http_status: Some(200),
            content_kind,
            body,
            byte_size,
            error: None,
        }
    }

    /// Build an empty `PageContent` representing a failed or skipped fetch.
    pub fn empty(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetched_at: Utc::now(),
            http_status: None,
            content_kind: ContentKind::Empty,
            body: String::new(),
            byte_size: 0,
            error: Some(error.into()),
        }
    }

    /// Set the observed HTTP status.
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Whether this page has any usable content.
    pub fn is_empty(&self) -> bool {
        matches!(self.content_kind, ContentKind::Empty)
    }

    /// Word count used against [`MIN_CONTENT_WORDS`].
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_content_truncates_body() {
        let long = "x".repeat(MAX_BODY_CHARS + 500);
        let page = PageContent::new("https://example.com", ContentKind::Markdown, long);
        assert_eq!(page.body.chars().count(), MAX_BODY_CHARS);
        assert_eq!(page.byte_size, page.body.len());
    }

    #[test]
    fn test_page_content_empty() {
        let page = PageContent::empty("https://example.com/broken", "timeout");
        assert!(page.is_empty());
        assert_eq!(page.error.as_deref(), Some("timeout"));
        assert!(page.body.is_empty());
    }

    #[test]
    fn test_word_count_threshold() {
        let sparse = PageContent::new("https://example.com", ContentKind::ExtractedText, "a b c");
        assert!(sparse.word_count() < MIN_CONTENT_WORDS);
    }
}
