//! Research Coordinator (C11) - orchestrates discovery, selection,
//! extraction, aggregation, embedding, and persistence into one
//! `init -> discovering -> selecting -> extracting -> aggregating ->
//! persisting -> done|failed` run for a single company.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator;
use crate::discovery::{self, DiscoveryLimits};
use crate::embedding::{self, Embedder};
use crate::error::{ExtractionError, Result};
use crate::extractor;
use crate::gateway::LlmClient;
use crate::progress::{JobOutcome, ProgressBus};
use crate::selection;
use crate::store::{DocumentStore, HybridStore, VectorIndex};
use crate::traits::crawler::Crawler;
use crate::types::company::CompanyRecord;
use crate::types::config::ResearchOptions;
use crate::types::progress::PhaseStatus;

const PHASE_DISCOVERING: &str = "discovering";
const PHASE_SELECTING: &str = "selecting";
const PHASE_EXTRACTING: &str = "extracting";
const PHASE_AGGREGATING: &str = "aggregating";
const PHASE_PERSISTING: &str = "persisting";

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_AGGREGATION_TIMEOUT: Duration = Duration::from_secs(60);

fn phase_timeout(override_secs: Option<u64>, default: Duration) -> Duration {
    override_secs.map(Duration::from_secs).unwrap_or(default)
}

/// §4.11 step 1: a seed given without a scheme (`"acme.test"`) is treated as
/// `https`, so callers don't each have to normalize it before passing it in.
fn normalize_seed_scheme(seed_url: &str) -> String {
    let trimmed = seed_url.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Run a full research pass on one company and persist the result.
///
/// Every already-constructed dependency (crawler, LLM, embedder, store,
/// progress bus) is supplied by the caller; this function reads no
/// environment variables and opens no network connections of its own beyond
/// what `discovery::discover`'s sitemap fetch needs, for which it builds a
/// plain `reqwest::Client` honoring `options.ssl_verify`.
///
/// Returns the persisted record even when its `scrape_status` is `partial`
/// or `failed` - those are successful pipeline runs over an uncooperative
/// site, not coordinator errors. `Err` is reserved for conditions the
/// pipeline itself cannot recover from: cancellation, or a store failure.
#[allow(clippy::too_many_arguments)]
pub async fn research<C, L, E, V, D>(
    crawler: &C,
    llm: &L,
    embedder: &E,
    store: &HybridStore<V, D>,
    progress: &ProgressBus,
    company_name: &str,
    seed_url: &str,
    options: &ResearchOptions,
    cancellation: &CancellationToken,
) -> Result<CompanyRecord>
where
    C: Crawler,
    L: LlmClient,
    E: Embedder,
    V: VectorIndex,
    D: DocumentStore,
{
    let job_id = options.job_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    progress.start_job(&job_id, company_name)?;

    let seed_url = normalize_seed_scheme(seed_url);
    let run_start = Instant::now();
    let outcome = run_phases(
        crawler, llm, embedder, store, progress, &job_id, company_name, &seed_url, options, cancellation,
    )
    .await;

    match outcome {
        Ok(record) => {
            // §4.11 step 7: the job closes `success` iff `scrape_status` is
            // `success` or `partial` - a `failed` scrape is a job failure
            // even though the coordinator still returns the record.
            let job_outcome = match record.scrape_status {
                crate::types::company::ScrapeStatus::Success | crate::types::company::ScrapeStatus::Partial => {
                    JobOutcome::Completed(format!("scrape_status={:?}", record.scrape_status))
                }
                crate::types::company::ScrapeStatus::Failed => JobOutcome::Failed(
                    record.scrape_error.clone().unwrap_or_else(|| "scrape failed".to_string()),
                ),
            };
            progress.complete_job(&job_id, job_outcome)?;
            Ok(record)
        }
        Err(e) => {
            progress.complete_job(&job_id, JobOutcome::Failed(e.to_string()))?;
            let _ = run_start; // duration not needed on the error path
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_phases<C, L, E, V, D>(
    crawler: &C,
    llm: &L,
    embedder: &E,
    store: &HybridStore<V, D>,
    progress: &ProgressBus,
    job_id: &str,
    company_name: &str,
    seed_url: &str,
    options: &ResearchOptions,
    cancellation: &CancellationToken,
) -> Result<CompanyRecord>
where
    C: Crawler,
    L: LlmClient,
    E: Embedder,
    V: VectorIndex,
    D: DocumentStore,
{
    let run_start = Instant::now();
    let http_client = build_http_client(options.ssl_verify)?;

    check_cancelled(cancellation)?;
    progress.start_phase(job_id, PHASE_DISCOVERING)?;
    let discovery_limits = DiscoveryLimits {
        max_depth: options.max_depth,
        max_wall_time: phase_timeout(options.phase_timeouts.discovery_secs, DEFAULT_DISCOVERY_TIMEOUT),
        ..DiscoveryLimits::default()
    };
    let discovered = discovery::discover(crawler, &http_client, seed_url, &discovery_limits).await;
    progress.set_phase_detail(job_id, PHASE_DISCOVERING, "pages_found", discovered.len().to_string())?;
    progress.end_phase(job_id, PHASE_DISCOVERING, PhaseStatus::Completed)?;

    check_cancelled(cancellation)?;
    progress.start_phase(job_id, PHASE_SELECTING)?;
    let candidates = discovered.urls();
    let selection_timeout = phase_timeout(options.phase_timeouts.selection_secs, DEFAULT_SELECTION_TIMEOUT);
    let outcome = selection::select(llm, &candidates, company_name, options.max_pages, selection_timeout).await;
    let selected = outcome.urls;
    progress.set_phase_detail(job_id, PHASE_SELECTING, "urls_selected", selected.len().to_string())?;
    if outcome.used_fallback {
        progress.log(job_id, "page selection fell back to heuristic ranking")?;
        progress.end_phase(job_id, PHASE_SELECTING, PhaseStatus::Failed)?;
    } else {
        progress.end_phase(job_id, PHASE_SELECTING, PhaseStatus::Completed)?;
    }

    check_cancelled(cancellation)?;
    progress.start_phase(job_id, PHASE_EXTRACTING)?;
    let extraction_timeout = phase_timeout(options.phase_timeouts.extraction_secs, DEFAULT_EXTRACTION_TIMEOUT);
    let pages = match tokio::time::timeout(extraction_timeout, extractor::extract(crawler, &selected, options.concurrency)).await {
        Ok(pages) => pages,
        Err(_) => {
            tracing::warn!(company = %company_name, "extraction phase timed out, proceeding with no pages");
            Vec::new()
        }
    };
    for page in &pages {
        progress.record_page_scrape(job_id, &page.url, !page.is_empty())?;
    }
    let extraction_status = if extractor::is_total_failure(&pages) {
        PhaseStatus::Failed
    } else {
        PhaseStatus::Completed
    };
    progress.end_phase(job_id, PHASE_EXTRACTING, extraction_status)?;

    check_cancelled(cancellation)?;
    progress.start_phase(job_id, PHASE_AGGREGATING)?;
    let aggregation_timeout = phase_timeout(options.phase_timeouts.aggregation_secs, DEFAULT_AGGREGATION_TIMEOUT);
    let mut record = aggregator::aggregate(llm, &pages, company_name, seed_url, aggregation_timeout).await;
    progress.record_llm_call(job_id, "aggregation", record.ai_summary.is_some())?;
    record.pages_crawled = pages.iter().filter(|p| !p.is_empty()).map(|p| p.url.clone()).collect();
    record.crawl_duration_ms = Some(run_start.elapsed().as_millis() as u64);
    let aggregation_status = match record.scrape_status {
        crate::types::company::ScrapeStatus::Failed => PhaseStatus::Failed,
        _ => PhaseStatus::Completed,
    };
    progress.end_phase(job_id, PHASE_AGGREGATING, aggregation_status)?;

    check_cancelled(cancellation)?;
    progress.start_phase(job_id, PHASE_PERSISTING)?;
    // §4.6/§8 scenario 5: a failed scrape still writes its document record
    // but performs no vector upsert - there's nothing meaningful to embed.
    record.embedding = if record.scrape_status == crate::types::company::ScrapeStatus::Failed {
        None
    } else {
        embedding::embed_record(embedder, &record).await
    };
    let persisted = store.upsert(record).await?;
    progress.end_phase(job_id, PHASE_PERSISTING, PhaseStatus::Completed)?;

    Ok(persisted)
}

fn check_cancelled(cancellation: &CancellationToken) -> Result<()> {
    if cancellation.is_cancelled() {
        Err(ExtractionError::Cancelled)
    } else {
        Ok(())
    }
}

fn build_http_client(ssl_verify: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(!ssl_verify)
        .build()
        .map_err(|e| ExtractionError::Config(Box::new(e)))
}
