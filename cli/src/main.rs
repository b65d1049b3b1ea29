//! `theodore` - illustrative CLI surface over the `extraction` crate's
//! research pipeline (C1-C11). Out-of-core: everything here is
//! configuration assembly and client wiring, not pipeline logic.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extraction::{
    ai::OpenAI, gateway::ProviderChain, CrawlerExt, HttpCrawler, HybridStore, ProgressBus,
    RateLimitedLlm, ValidatedCrawler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "theodore")]
#[command(about = "Company intelligence extraction pipeline")]
#[command(version)]
struct Cli {
    /// Path to an optional theodore.json config file.
    #[arg(long, default_value = "theodore.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a single company starting from a seed URL.
    Research {
        /// Company name.
        name: String,
        /// Seed URL to start discovery from.
        url: String,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        llm_rpm: Option<u32>,
        #[arg(long)]
        job_id: Option<String>,
        /// Skip TLS certificate verification.
        #[arg(long)]
        insecure: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,extraction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let resolved = match config::resolve(&cli.config) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(cli.command, resolved).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::from(2)
        }
    }
}

async fn run(command: Commands, resolved: config::ResolvedConfig) -> Result<ExitCode> {
    let Commands::Research {
        name,
        url,
        max_depth,
        max_pages,
        concurrency,
        llm_rpm,
        job_id,
        insecure,
    } = command;

    let mut options = resolved.options;
    if let Some(v) = max_depth {
        options.max_depth = v;
    }
    if let Some(v) = max_pages {
        options.max_pages = v;
    }
    if let Some(v) = concurrency {
        options.concurrency = v;
    }
    if let Some(v) = llm_rpm {
        options.llm_rpm = v;
    }
    if let Some(v) = job_id {
        options.job_id = Some(v);
    }
    if insecure {
        options.ssl_verify = false;
    }

    let crawler = ValidatedCrawler::new(HttpCrawler::new()).rate_limited(2);

    let llm_provider: Box<dyn extraction::LlmClient> = Box::new(RateLimitedLlm::new(
        OpenAI::new(resolved.openai_api_key.clone()),
        options.llm_rpm,
    ));
    let llm = ProviderChain::new(llm_provider);

    let embedder = OpenAI::new(resolved.openai_api_key.clone());

    let store = HybridStore::in_memory();

    let progress = match &resolved.progress_path {
        Some(path) => ProgressBus::with_persist_path(path.as_str()).context("loading progress history")?,
        None => ProgressBus::new(),
    };

    let cancellation = tokio_util::sync::CancellationToken::new();

    let record = extraction::research(
        &crawler,
        &llm,
        &embedder,
        &store,
        &progress,
        &name,
        &url,
        &options,
        &cancellation,
    )
    .await
    .context("research run failed")?;

    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(match record.scrape_status {
        extraction::ScrapeStatus::Success | extraction::ScrapeStatus::Partial => ExitCode::SUCCESS,
        extraction::ScrapeStatus::Failed => ExitCode::FAILURE,
    })
}
