//! Parallel Extractor (C6) - bounded-concurrency fetch of selected URLs.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::traits::crawler::Crawler;
use crate::types::page::{ContentKind, PageContent, MIN_CONTENT_WORDS};

/// Fetch every URL in `urls` through `crawler`, bounded to `concurrency`
/// in-flight fetches at a time. Preserves input order in the output
/// regardless of completion order. Each URL is attempted once.
pub async fn extract<C: Crawler + ?Sized>(
    crawler: &C,
    urls: &[String],
    concurrency: usize,
) -> Vec<PageContent> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let futures = urls.iter().map(|url| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            fetch_one(crawler, url).await
        }
    });

    join_all(futures).await
}

async fn fetch_one<C: Crawler + ?Sized>(crawler: &C, url: &str) -> PageContent {
    match crawler.fetch(url).await {
        Ok(page) => {
            if page.content.trim().is_empty() {
                return PageContent::empty(url, "empty response body").with_http_status(page.status_code);
            }
            let content = PageContent::new(url, ContentKind::Markdown, page.content)
                .with_http_status(page.status_code);
            if content.word_count() < MIN_CONTENT_WORDS {
                PageContent::empty(url, "content below minimum word threshold")
                    .with_http_status(page.status_code)
            } else {
                content
            }
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "extraction fetch failed");
            PageContent::empty(url, e.to_string())
        }
    }
}

/// Whether an extraction batch should be treated as a total failure: every
/// page came back empty and the input was non-empty.
pub fn is_total_failure(pages: &[PageContent]) -> bool {
    !pages.is_empty() && pages.iter().all(|p| p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCrawler;
    use crate::types::page::CrawledPage;

    #[tokio::test]
    async fn test_extract_preserves_input_order() {
        let crawler = MockCrawler::new()
            .with_page(CrawledPage::new("https://a.test/1", "one two three four five six seven eight nine ten"))
            .with_page(CrawledPage::new("https://a.test/2", "one two three four five six seven eight nine ten"))
            .with_page(CrawledPage::new("https://a.test/3", "one two three four five six seven eight nine ten"));

        let urls = vec![
            "https://a.test/3".to_string(),
            "https://a.test/1".to_string(),
            "https://a.test/2".to_string(),
        ];

        let results = extract(&crawler, &urls, 2).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].url, "https://a.test/3");
        assert_eq!(results[1].url, "https://a.test/1");
        assert_eq!(results[2].url, "https://a.test/2");
    }

    #[tokio::test]
    async fn test_extract_missing_url_is_empty_not_error() {
        let crawler = MockCrawler::new();
        let urls = vec!["https://missing.test".to_string()];
        let results = extract(&crawler, &urls, 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_empty());
    }

    #[tokio::test]
    async fn test_extract_below_word_threshold_is_empty() {
        let crawler = MockCrawler::new().with_page(CrawledPage::new("https://a.test", "too short"));
        let results = extract(&crawler, &["https://a.test".to_string()], 1).await;
        assert!(results[0].is_empty());
    }

    #[tokio::test]
    async fn test_is_total_failure() {
        let all_empty = vec![PageContent::empty("https://a.test", "boom")];
        assert!(is_total_failure(&all_empty));

        let mixed = vec![
            PageContent::empty("https://a.test", "boom"),
            PageContent::new("https://b.test", ContentKind::Markdown, "one two three four five six seven eight nine ten"),
        ];
        assert!(!is_total_failure(&mixed));

        assert!(!is_total_failure(&[]));
    }
}
