//! # Theodore Extraction Library
//!
//! The four-phase company research pipeline plus the hybrid vector/document
//! store that persists its output.
//!
//! ## Architecture
//!
//! ```text
//! DISCOVER (C2/C3) -> SELECT (C5, via C4) -> EXTRACT (C6, via C1) -> AGGREGATE (C7, via C4) -> EMBED (C8) -> STORE (C9)
//! ```
//!
//! [`coordinator::research`] (C11) drives all six steps for one company,
//! emitting phase transitions into a [`progress::ProgressBus`] (C10) the
//! whole way through.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use extraction::{coordinator, store::HybridStore, progress::ProgressBus};
//! use extraction::types::config::ResearchOptions;
//! use extraction::crawlers::HttpCrawler;
//! use extraction::ai::OpenAI;
//! use tokio_util::sync::CancellationToken;
//!
//! let crawler = HttpCrawler::new();
//! let llm = OpenAI::from_env()?;
//! let store = HybridStore::in_memory();
//! let progress = ProgressBus::new();
//! let options = ResearchOptions::default();
//!
//! let record = coordinator::research(
//!     &crawler, &llm, &llm, &store, &progress,
//!     "Acme Corp", "https://acme.example", &options, &CancellationToken::new(),
//! ).await?;
//!
//! println!("{}", serde_json::to_string_pretty(&record)?);
//! ```
//!
//! ## Modules
//!
//! - [`traits`] - the [`traits::crawler::Crawler`] seam (C1)
//! - [`discovery`] - URL normalization, filtering, link discovery (C2/C3)
//! - [`gateway`] - LLM gateway: rate limiting, timeouts, fallback chain (C4)
//! - [`selection`] - page selection over discovered URLs (C5)
//! - [`extractor`] - bounded-concurrency content extraction (C6)
//! - [`aggregator`] - LLM-driven intelligence aggregation (C7)
//! - [`embedding`] - record-to-vector embedding (C8)
//! - [`store`] - hybrid vector + document store contract and in-memory backend (C9)
//! - [`stores`] - persistent C9 backends (SQLite, PostgreSQL)
//! - [`progress`] - per-job progress bus (C10)
//! - [`coordinator`] - phase orchestration for one research run (C11)
//! - [`crawlers`] - [`traits::crawler::Crawler`] implementations
//! - [`security`] - credential handling
//! - [`types`] - shared data types
//! - [`testing`] - mock implementations for testing

pub mod aggregator;
pub mod coordinator;
pub mod crawlers;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod progress;
pub mod security;
pub mod selection;
pub mod store;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core error types at crate root
pub use error::{CrawlError, ExtractionError, SecurityError};

pub use traits::crawler::Crawler;

pub use types::{
    company::{CompanyRecord, ContactInfo, ScrapeStatus},
    config::{CrawlConfig, PhaseTimeouts, ResearchOptions},
    page::{ContentKind, CrawledPage, PageContent},
    progress::{JobProgress, JobStatus, PhaseProgress, PhaseStatus},
};

// Re-export the LLM gateway (C4)
pub use gateway::{CompletionOptions, LlmClient, ProviderChain, RateLimitedLlm};

// Re-export link discovery (C2/C3)
pub use discovery::{accept, discover, normalize_url, DiscoveredUrl, DiscoveryLimits, DiscoveryOrigin, DiscoverySet};

// Re-export the embedding seam (C8)
pub use embedding::Embedder;

// Re-export the hybrid store (C9)
pub use store::{DocumentStore, HybridStore, IndexStats, Metadata, MetadataFilter, VectorIndex};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export the progress bus (C10)
pub use progress::ProgressBus;

// Re-export the coordinator entrypoint (C11)
pub use coordinator::research;

// Re-export crawlers (C1)
pub use crawlers::{fetch_robots_txt, CrawlerExt, HttpCrawler, RateLimitedCrawler, RobotsTxt, UrlValidator, ValidatedCrawler};

#[cfg(feature = "browser")]
pub use crawlers::{native_browser_available, BrowserCrawler};

// Re-export testing utilities
pub use testing::{MockCrawler, MockLlm, TestScenario};
