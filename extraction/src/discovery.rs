//! URL normalization/filtering (C2) and link discovery (C3).

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use url::Url;

use crate::crawlers::robots::{fetch_robots_txt, RobotsTxt};
use crate::traits::crawler::Crawler;

/// Hard cap on a discovery set's size, applied after filtering.
pub const MAX_DISCOVERED_URLS: usize = 1_000;

const REJECTED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".ico", ".css", ".js", ".woff", ".woff2",
    ".ttf", ".mp4", ".zip",
];

const REJECTED_PATH_FRAGMENTS: &[&str] =
    &["/wp-admin/", "/admin/", "/login", "/logout", "/cart", "/checkout"];

const MAX_URL_LENGTH: usize = 200;

/// Resolve `raw` against `base` and canonicalize it.
///
/// Canonical form: lower-cased host, default ports/fragment/query dropped,
/// no trailing slash (root included). Returns `None` for anything that
/// doesn't parse as an absolute HTTP(S) URL once resolved.
pub fn normalize_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "#" || raw == "/" {
        return base_as_normalized(base);
    }

    let base_url = Url::parse(base).ok()?;
    let mut url = base_url.join(raw).ok()?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    url.set_fragment(None);
    url.set_query(None);

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    let default_port = match url.scheme() {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let is_root = url.path() == "/";
    Some(strip_root_slash(url.to_string(), is_root))
}

fn base_as_normalized(base: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    url.set_fragment(None);
    url.set_query(None);
    let is_root = url.path() == "/";
    Some(strip_root_slash(url.to_string(), is_root))
}

/// The `url` crate always serializes an authority URL with at least a `/`
/// path, so a bare root (`https://example.com/`) needs its trailing slash
/// stripped by hand to reach the spec's no-trailing-slash canonical form.
fn strip_root_slash(serialized: String, is_root: bool) -> String {
    if is_root {
        serialized.strip_suffix('/').map(str::to_string).unwrap_or(serialized)
    } else {
        serialized
    }
}

/// Whether `url` should ever enter a [`DiscoverySet`] for the given origin host.
pub fn accept(url: &str, origin_host: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str() else { return false };
    if !host.eq_ignore_ascii_case(origin_host) {
        return false;
    }
    if url.len() > MAX_URL_LENGTH {
        return false;
    }

    let path_lower = parsed.path().to_lowercase();
    if REJECTED_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
        return false;
    }
    if REJECTED_PATH_FRAGMENTS.iter().any(|frag| path_lower.contains(frag)) {
        return false;
    }

    true
}

/// Where a discovered URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOrigin {
    Robots,
    Sitemap,
    Crawl,
}

/// One member of a [`DiscoverySet`].
#[derive(Debug, Clone)]
pub struct DiscoveredUrl {
    pub url: String,
    pub origin: DiscoveryOrigin,
    pub depth: usize,
}

/// The unique, same-origin, BFS-ordered set of URLs found for a company site.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySet {
    entries: Vec<DiscoveredUrl>,
    seen: HashSet<String>,
}

impl DiscoverySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a URL if not already present and under the hard cap. Returns
    /// whether it was actually inserted.
    pub fn insert(&mut self, url: String, origin: DiscoveryOrigin, depth: usize) -> bool {
        if self.entries.len() >= MAX_DISCOVERED_URLS || self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.entries.push(DiscoveredUrl { url, origin, depth });
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DiscoveredUrl] {
        &self.entries
    }

    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.url.clone()).collect()
    }
}

/// Bounds enforced during recursive crawl (§4.3's three hard caps).
#[derive(Debug, Clone)]
pub struct DiscoveryLimits {
    pub max_depth: usize,
    pub max_links_per_page: usize,
    pub max_visited_urls: usize,
    pub max_wall_time: Duration,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_links_per_page: 50,
            max_visited_urls: 200,
            max_wall_time: Duration::from_secs(30),
        }
    }
}

/// Extract link targets from a Markdown-rendered page body and resolve them
/// against `base`. Crawlers hand discovery already-cleaned content, so link
/// extraction here works on `[text](url)` syntax rather than raw HTML.
fn extract_markdown_links(body: &str, base: &str) -> Vec<String> {
    let pattern = regex::Regex::new(r"\]\(([^)\s]+)\)").unwrap();
    let Ok(base_url) = Url::parse(base) else { return Vec::new() };

    pattern
        .captures_iter(body)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| base_url.join(m.as_str()).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Recursively resolve sitemap / sitemap-index URLs into `<loc>` entries.
async fn collect_sitemap_urls(client: &reqwest::Client, sitemap_url: &str, depth: usize) -> Vec<String> {
    if depth > 3 {
        return Vec::new();
    }
    let Ok(response) = client.get(sitemap_url).send().await else {
        return Vec::new();
    };
    let Ok(body) = response.text().await else {
        return Vec::new();
    };

    let loc_pattern = regex::Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>").unwrap();
    let locs: Vec<String> = loc_pattern
        .captures_iter(&body)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let is_index = body.contains("<sitemapindex");
    if !is_index {
        return locs;
    }

    let mut resolved = Vec::new();
    for nested in locs {
        resolved.extend(Box::pin(collect_sitemap_urls(client, &nested, depth + 1)).await);
    }
    resolved
}

/// Discover the URL surface of a company site: robots.txt (sitemaps and
/// disallowed paths), sitemap entries, and a bounded recursive crawl,
/// unioned and filtered through [`accept`].
pub async fn discover<C: Crawler>(
    crawler: &C,
    http_client: &reqwest::Client,
    seed_url: &str,
    limits: &DiscoveryLimits,
) -> DiscoverySet {
    let mut set = DiscoverySet::new();

    let Ok(origin) = Url::parse(seed_url) else {
        return set;
    };
    let Some(origin_host) = origin.host_str().map(|s| s.to_string()) else {
        return set;
    };

    if let Some(homepage) = normalize_url(seed_url, seed_url) {
        set.insert(homepage, DiscoveryOrigin::Crawl, 0);
    }

    let robots = fetch_robots_txt(http_client, seed_url)
        .await
        .unwrap_or_else(|_| RobotsTxt::default());

    for disallowed_path in robots.disallowed_paths("*") {
        if let Some(normalized) = normalize_url(&disallowed_path, seed_url) {
            if accept(&normalized, &origin_host) {
                set.insert(normalized, DiscoveryOrigin::Robots, 0);
            }
        }
    }

    let mut sitemap_candidates: Vec<String> = robots.sitemaps().to_vec();
    if sitemap_candidates.is_empty() {
        let base = seed_url.trim_end_matches('/');
        sitemap_candidates.push(format!("{base}/sitemap.xml"));
        sitemap_candidates.push(format!("{base}/sitemap_index.xml"));
        sitemap_candidates.push(format!("{base}/sitemaps/sitemap.xml"));
    }

    for sitemap_url in sitemap_candidates {
        for loc in collect_sitemap_urls(http_client, &sitemap_url, 0).await {
            if let Some(normalized) = normalize_url(&loc, seed_url) {
                if accept(&normalized, &origin_host) {
                    set.insert(normalized, DiscoveryOrigin::Sitemap, 0);
                }
            }
        }
    }

    bfs_crawl(crawler, seed_url, &origin_host, limits, &mut set).await;

    set
}

async fn bfs_crawl<C: Crawler>(
    crawler: &C,
    seed_url: &str,
    origin_host: &str,
    limits: &DiscoveryLimits,
    set: &mut DiscoverySet,
) {
    let start = Instant::now();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((seed_url.to_string(), 0));

    while let Some((url, depth)) = queue.pop_front() {
        if start.elapsed() > limits.max_wall_time {
            tracing::warn!(seed = %seed_url, "discovery wall-time budget exceeded, returning partial set");
            break;
        }
        if visited.len() >= limits.max_visited_urls {
            tracing::warn!(seed = %seed_url, "discovery visited-url cap reached");
            break;
        }
        if depth > limits.max_depth || visited.contains(&url) {
            continue;
        }
        visited.insert(url.clone());

        match crawler.fetch(&url).await {
            Ok(page) => {
                if let Some(normalized) = normalize_url(&url, seed_url) {
                    if accept(&normalized, origin_host) {
                        set.insert(normalized, DiscoveryOrigin::Crawl, depth);
                    }
                }

                if depth < limits.max_depth {
                    let links = extract_markdown_links(&page.content, &url);
                    for link in links.into_iter().take(limits.max_links_per_page) {
                        if accept(&link, origin_host) && !visited.contains(&link) {
                            queue.push_back((link, depth + 1));
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "discovery fetch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCrawler;
    use crate::types::page::CrawledPage;

    #[test]
    fn test_normalize_collapses_trailing_slash_and_fragment() {
        let normalized = normalize_url("https://Example.com/About/#team", "https://example.com").unwrap();
        assert_eq!(normalized, "https://example.com/About");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize_url("https://example.com/about/", "https://example.com").unwrap();
        let twice = normalize_url(&once, "https://example.com").unwrap();
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        #[test]
        fn prop_normalize_is_idempotent(segment in "[a-zA-Z0-9/_-]{0,40}") {
            let base = "https://example.com";
            if let Some(once) = normalize_url(&format!("/{segment}"), base) {
                let twice = normalize_url(&once, base).unwrap();
                proptest::prop_assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn test_accept_rejects_cross_origin() {
        assert!(!accept("https://other.com/page", "example.com"));
        assert!(accept("https://example.com/page", "example.com"));
    }

    #[test]
    fn test_accept_rejects_binary_and_admin_paths() {
        assert!(!accept("https://example.com/logo.png", "example.com"));
        assert!(!accept("https://example.com/wp-admin/settings", "example.com"));
        assert!(!accept("https://example.com/login", "example.com"));
    }

    #[test]
    fn test_accept_rejects_non_url_tokens() {
        assert!(!accept("internal", "example.com"));
        assert!(!accept("external", "example.com"));
    }

    #[tokio::test]
    async fn test_discover_bfs_from_mock_crawler() {
        let crawler = MockCrawler::new()
            .with_page(CrawledPage::new(
                "https://example.com",
                "[About](/about) [Contact](/contact)",
            ))
            .with_page(CrawledPage::new("https://example.com/about", "About us."))
            .with_page(CrawledPage::new("https://example.com/contact", "Contact us."));

        let client = reqwest::Client::new();
        let limits = DiscoveryLimits::default();
        let set = discover(&crawler, &client, "https://example.com", &limits).await;

        assert!(set.contains("https://example.com"));
        assert!(set.contains("https://example.com/about"));
        assert!(set.contains("https://example.com/contact"));
    }

    #[tokio::test]
    async fn test_discover_respects_visited_cap() {
        let mut crawler = MockCrawler::new();
        let mut links = String::new();
        for i in 0..500 {
            links.push_str(&format!("[p{i}](/p{i}) "));
            crawler = crawler.with_page(CrawledPage::new(format!("https://example.com/p{i}"), "leaf page"));
        }
        crawler = crawler.with_page(CrawledPage::new("https://example.com", links));

        let client = reqwest::Client::new();
        let limits = DiscoveryLimits {
            max_visited_urls: 10,
            ..DiscoveryLimits::default()
        };
        let set = discover(&crawler, &client, "https://example.com", &limits).await;
        assert!(set.len() <= 10);
    }
}
