//! Configuration types for research and crawling.

use serde::{Deserialize, Serialize};

/// Configuration for crawl operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Starting URL to crawl
    pub url: String,

    /// Maximum number of pages to crawl
    pub max_pages: usize,

    /// Maximum depth to crawl (0 = only starting page)
    pub max_depth: usize,

    /// Delay between requests in milliseconds
    pub rate_limit_ms: u64,

    /// Respect robots.txt
    pub respect_robots: bool,

    /// Follow links to subdomains
    pub follow_subdomains: bool,

    /// URL patterns to include (regex)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL patterns to exclude (regex)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_pages: 100,
            max_depth: 3,
            rate_limit_ms: 1000,
            respect_robots: true,
            follow_subdomains: false,
            include_patterns: vec![],
            exclude_patterns: vec![],
        }
    }
}

impl CrawlConfig {
    /// Create a new crawl config for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum pages.
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    /// Set maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set rate limit.
    pub fn with_rate_limit_ms(mut self, ms: u64) -> Self {
        self.rate_limit_ms = ms;
        self
    }

    /// Disable robots.txt respect.
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    /// Enable subdomain following.
    pub fn with_subdomains(mut self) -> Self {
        self.follow_subdomains = true;
        self
    }

    /// Add an include pattern.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }
}

/// Per-phase timeout overrides, in seconds. Any field left `None` falls
/// back to that phase's documented default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTimeouts {
    pub discovery_secs: Option<u64>,
    pub selection_secs: Option<u64>,
    pub extraction_secs: Option<u64>,
    pub aggregation_secs: Option<u64>,
}

/// Options accepted by the research coordinator's `research()` entrypoint.
///
/// This is the one configuration surface the core itself understands;
/// everything upstream of it (env vars, files, secrets) is the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOptions {
    /// Discovery recursion depth. Default 3.
    pub max_depth: usize,

    /// Cap on pages extracted. Default 50.
    pub max_pages: usize,

    /// Parallel fetches in the extractor. Default 10.
    pub concurrency: usize,

    /// Per-phase timeout overrides.
    #[serde(default)]
    pub phase_timeouts: PhaseTimeouts,

    /// LLM requests per minute. Default 8.
    pub llm_rpm: u32,

    /// Whether to verify TLS certificates. Default true.
    pub ssl_verify: bool,

    /// Externally supplied job id; a fresh one is minted when absent.
    #[serde(default)]
    pub job_id: Option<String>,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 50,
            concurrency: 10,
            phase_timeouts: PhaseTimeouts::default(),
            llm_rpm: 8,
            ssl_verify: true,
            job_id: None,
        }
    }
}

impl ResearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_llm_rpm(mut self, rpm: u32) -> Self {
        self.llm_rpm = rpm;
        self
    }

    pub fn without_ssl_verify(mut self) -> Self {
        self.ssl_verify = false;
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Preset mirroring the store-locator override: shallower, narrower,
    /// less concurrent crawling for sites that are mostly a location finder.
    pub fn store_locator() -> Self {
        Self {
            max_depth: 2,
            max_pages: 20,
            concurrency: 5,
            ..Self::default()
        }
    }

    /// Preset mirroring the large-retailer override: homepage-depth only.
    pub fn large_retailer() -> Self {
        Self {
            max_depth: 1,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_options_presets() {
        let default = ResearchOptions::default();
        assert_eq!(default.max_depth, 3);
        assert_eq!(default.concurrency, 10);

        let locator = ResearchOptions::store_locator();
        assert_eq!(locator.max_depth, 2);
        assert_eq!(locator.max_pages, 20);
        assert_eq!(locator.concurrency, 5);

        let retailer = ResearchOptions::large_retailer();
        assert_eq!(retailer.max_depth, 1);
    }
}
