//! Crawler implementations (C1, plus rate-limiting/validation decorators).
//!
//! - `HttpCrawler` - direct HTTP crawling with link following
//! - `RateLimitedCrawler` - wrapper that adds rate limiting
//! - `ValidatedCrawler` - wrapper that validates URLs for SSRF safety
//! - `RobotsTxt` - robots.txt parsing for respectful crawling

pub mod http;
pub mod rate_limited;
pub mod robots;

#[cfg(feature = "browser")]
pub mod browser;

pub use http::HttpCrawler;
pub use rate_limited::{CrawlerExt, RateLimitedCrawler};
pub use robots::{fetch_robots_txt, RobotsTxt};

#[cfg(feature = "browser")]
pub use browser::{native_browser_available, BrowserCrawler};

// Re-export the validated crawler from traits
pub use crate::traits::crawler::{UrlValidator, ValidatedCrawler};
