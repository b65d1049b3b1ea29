//! Plain HTTP crawler - the `Crawler` trait's direct, undecorated
//! implementation. Rate limiting and SSRF validation are layered on top via
//! [`super::rate_limited::RateLimitedCrawler`] and
//! [`crate::traits::crawler::ValidatedCrawler`], not built in here.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};
use url::Url;

use crate::error::{CrawlError, CrawlResult};
use crate::traits::crawler::Crawler;
use crate::types::{config::CrawlConfig, page::CrawledPage};

/// Direct HTTP(S) crawler with link-following BFS.
///
/// Suitable for server-rendered sites. For JavaScript-heavy sites, pair this
/// with a rendered-fetch collaborator at a higher layer (C1's `rendered`
/// mode); this crawler only ever performs the `static` fetch.
pub struct HttpCrawler {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for HttpCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCrawler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
            user_agent: "TheodoreBot/1.0".to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn fetch_with_html(&self, url: &str) -> CrawlResult<(CrawledPage, String, Url)> {
        debug!(url = %url, "HTTP fetch starting");

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                CrawlError::Http(Box::new(e))
            })?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(CrawlError::Http(Box::new(std::io::Error::other(format!(
                "HTTP {status}"
            )))));
        }

        let mut headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v) = v.to_str() {
                headers.insert(k.as_str().to_string(), v.to_string());
            }
        }

        let html = response.text().await.map_err(|e| CrawlError::Http(Box::new(e)))?;
        let title = extract_title(&html);
        let content = html_to_markdown(&html);

        let mut page = CrawledPage::new(url, content);
        page.status_code = status.as_u16();
        page.headers = headers;
        if let Some(title) = title {
            page = page.with_title(title);
        }

        Ok((page, html, final_url))
    }

    fn extract_links(&self, base_url: &Url, html: &str) -> Vec<String> {
        extract_links(base_url, html)
    }

    fn should_crawl(&self, url: &Url, base_url: &Url, config: &CrawlConfig) -> bool {
        let base_host = base_url.host_str().unwrap_or("");
        let url_host = url.host_str().unwrap_or("");
        if !config.follow_subdomains && url_host != base_host {
            return false;
        }
        if config.follow_subdomains && !url_host.ends_with(base_host) {
            return false;
        }

        let path = url.path();
        if !config.include_patterns.is_empty()
            && !config.include_patterns.iter().any(|p| path.contains(p.as_str()))
        {
            return false;
        }
        if config.exclude_patterns.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
        true
    }
}

pub(crate) fn extract_links(base_url: &Url, html: &str) -> Vec<String> {
    let href_pattern = regex::Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap();
    let mut links = Vec::new();

    for cap in href_pattern.captures_iter(html) {
        let Some(href) = cap.get(1) else { continue };
        let href = href.as_str();
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        if let Ok(resolved) = base_url.join(href) {
            links.push(resolved.to_string());
        }
    }

    links
}

pub(crate) fn extract_title(html: &str) -> Option<String> {
    let pattern = regex::Regex::new(r"<title[^>]*>(.*?)</title>").ok()?;
    pattern
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Strip script/style and tags, leaving a Markdown-ish rendering. This is
/// the degrade path C1 falls back to when no headless-rendering
/// collaborator is wired in.
pub(crate) fn html_to_markdown(html: &str) -> String {
    let mut text = html.to_string();

    for (pattern, replacement) in [
        (r"(?s)<script[^>]*>.*?</script>", ""),
        (r"(?s)<style[^>]*>.*?</style>", ""),
        (r"(?s)<nav[^>]*>.*?</nav>", ""),
        (r"(?s)<footer[^>]*>.*?</footer>", ""),
    ] {
        text = regex::Regex::new(pattern).unwrap().replace_all(&text, replacement).to_string();
    }

    for (pattern, replacement) in [
        (r"<h1[^>]*>(.*?)</h1>", "# $1\n"),
        (r"<h2[^>]*>(.*?)</h2>", "## $1\n"),
        (r"<h3[^>]*>(.*?)</h3>", "### $1\n"),
        (r"<p[^>]*>(.*?)</p>", "$1\n\n"),
        (r"<br\s*/?>", "\n"),
        (r#"<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#, "[$2]($1)"),
        (r"<li[^>]*>(.*?)</li>", "- $1\n"),
    ] {
        text = regex::Regex::new(pattern).unwrap().replace_all(&text, replacement).to_string();
    }

    text = regex::Regex::new(r"<[^>]+>").unwrap().replace_all(&text, "").to_string();
    text = regex::Regex::new(r"\n{3,}").unwrap().replace_all(&text, "\n\n").to_string();

    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(&self, config: &CrawlConfig) -> CrawlResult<Vec<CrawledPage>> {
        let mut base_url = Url::parse(&config.url).map_err(|_| CrawlError::InvalidUrl {
            url: config.url.clone(),
        })?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut pages = Vec::new();
        let mut base_resolved = false;

        queue.push_back((config.url.clone(), 0));

        while let Some((url, depth)) = queue.pop_front() {
            if pages.len() >= config.max_pages {
                break;
            }
            if depth > config.max_depth || visited.contains(&url) {
                continue;
            }
            visited.insert(url.clone());

            match self.fetch_with_html(&url).await {
                Ok((page, html, final_url)) => {
                    if !base_resolved {
                        if final_url.host_str() != base_url.host_str() {
                            base_url = final_url.clone();
                        }
                        base_resolved = true;
                    }

                    if depth < config.max_depth {
                        for link in self.extract_links(&final_url, &html) {
                            if let Ok(link_url) = Url::parse(&link) {
                                if self.should_crawl(&link_url, &base_url, config)
                                    && !visited.contains(&link)
                                {
                                    queue.push_back((link, depth + 1));
                                }
                            }
                        }
                    }

                    pages.push(page);
                }
                Err(e) => warn!(url = %url, error = %e, "failed to fetch page during crawl"),
            }

            if config.rate_limit_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(config.rate_limit_ms)).await;
            }
        }

        Ok(pages)
    }

    async fn fetch(&self, url: &str) -> CrawlResult<CrawledPage> {
        let (page, _html, _final_url) = self.fetch_with_html(url).await?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_skips_anchors_and_scripts() {
        let base = Url::parse("https://example.com/page").unwrap();
        let html = r##"
            <a href="/about">About</a>
            <a href="https://example.com/contact">Contact</a>
            <a href="#section">Anchor</a>
            <a href="javascript:void(0)">JS</a>
        "##;
        let links = extract_links(&base, html);
        assert!(links.contains(&"https://example.com/about".to_string()));
        assert!(links.contains(&"https://example.com/contact".to_string()));
        assert!(!links.iter().any(|l| l.contains('#')));
    }

    #[test]
    fn test_html_to_markdown_strips_script_and_nav() {
        let html = "<nav>Menu</nav><h1>Title</h1><script>evil()</script><p>Body text.</p>";
        let md = html_to_markdown(html);
        assert!(md.contains("# Title"));
        assert!(md.contains("Body text."));
        assert!(!md.contains("evil()"));
        assert!(!md.contains("Menu"));
    }

    #[test]
    fn test_should_crawl_same_host_only_by_default() {
        let crawler = HttpCrawler::new();
        let base = Url::parse("https://example.com").unwrap();
        let config = CrawlConfig::new("https://example.com");
        let same = Url::parse("https://example.com/page").unwrap();
        let other = Url::parse("https://other.com/page").unwrap();
        assert!(crawler.should_crawl(&same, &base, &config));
        assert!(!crawler.should_crawl(&other, &base, &config));
    }
}
