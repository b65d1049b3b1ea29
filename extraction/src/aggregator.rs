//! Intelligence Aggregator (C7) - fuse extracted page content into a
//! structured [`CompanyRecord`] via the LLM gateway.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::gateway::{CompletionOptions, LlmClient};
use crate::types::company::{CompanyRecord, ContactInfo, ScrapeStatus};
use crate::types::page::PageContent;

/// Hard cap on the concatenated corpus handed to the aggregation prompt.
pub const MAX_CORPUS_CHARS: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageGroup {
    About,
    Products,
    Team,
    Careers,
    Contact,
    News,
    Main,
}

impl PageGroup {
    fn label(self) -> &'static str {
        match self {
            PageGroup::About => "About",
            PageGroup::Products => "Products/Services",
            PageGroup::Team => "Team/Leadership",
            PageGroup::Careers => "Careers",
            PageGroup::Contact => "Contact",
            PageGroup::News => "News",
            PageGroup::Main => "Main",
        }
    }

    fn from_url(url: &str) -> Self {
        let path = Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_default();
        if path.contains("contact") {
            PageGroup::Contact
        } else if path.contains("team") || path.contains("leadership") || path.contains("about-us/team") {
            PageGroup::Team
        } else if path.contains("career") || path.contains("job") {
            PageGroup::Careers
        } else if path.contains("news") || path.contains("press") || path.contains("blog") {
            PageGroup::News
        } else if path.contains("product") || path.contains("service") {
            PageGroup::Products
        } else if path.contains("about") || path.contains("our-story") || path.contains("history") {
            PageGroup::About
        } else {
            PageGroup::Main
        }
    }
}

/// Group non-empty pages by inferred page type and concatenate into
/// labelled sections, truncated to [`MAX_CORPUS_CHARS`] total.
fn build_corpus(pages: &[PageContent]) -> String {
    let mut groups: Vec<(PageGroup, Vec<&PageContent>)> = Vec::new();
    for page in pages.iter().filter(|p| !p.is_empty()) {
        let group = PageGroup::from_url(&page.url);
        if let Some(entry) = groups.iter_mut().find(|(g, _)| *g == group) {
            entry.1.push(page);
        } else {
            groups.push((group, vec![page]));
        }
    }

    let mut corpus = String::new();
    'outer: for (group, group_pages) in &groups {
        corpus.push_str(&format!("## {}\n", group.label()));
        for page in group_pages {
            let section = format!("### {}\n{}\n\n", page.url, page.body);
            if corpus.len() + section.len() > MAX_CORPUS_CHARS {
                let remaining = MAX_CORPUS_CHARS.saturating_sub(corpus.len());
                corpus.push_str(&section.chars().take(remaining).collect::<String>());
                break 'outer;
            }
            corpus.push_str(&section);
        }
    }
    corpus
}

/// Parsed shape of the aggregation model's JSON response. Every field is
/// optional; absent fields leave the corresponding `CompanyRecord` field at
/// its default.
#[derive(Debug, Default, Deserialize)]
struct AggregationResponse {
    industry: Option<String>,
    business_model: Option<String>,
    target_market: Option<String>,
    company_size: Option<String>,
    company_description: Option<String>,
    value_proposition: Option<String>,
    #[serde(default)]
    key_services: Vec<String>,
    #[serde(default)]
    competitive_advantages: Vec<String>,
    #[serde(default)]
    tech_stack: Vec<String>,
    #[serde(default)]
    pain_points: Vec<String>,
    #[serde(default)]
    leadership_team: Vec<String>,
    #[serde(default)]
    recent_news: Vec<String>,
    #[serde(default)]
    certifications: Vec<String>,
    #[serde(default)]
    partnerships: Vec<String>,
    #[serde(default)]
    awards: Vec<String>,
    location: Option<String>,
    founding_year: Option<i32>,
    employee_count_range: Option<String>,
    company_culture: Option<String>,
    funding_status: Option<String>,
    #[serde(default)]
    contact_email: Option<String>,
    #[serde(default)]
    contact_phone: Option<String>,
    #[serde(default)]
    contact_address: Option<String>,
    company_stage: Option<String>,
    tech_sophistication: Option<String>,
    business_model_type: Option<String>,
    geographic_scope: Option<String>,
    decision_maker_type: Option<String>,
    sales_complexity: Option<String>,
    #[serde(default)]
    has_job_listings: bool,
    #[serde(default)]
    job_listings_count: i32,
    ai_summary: Option<String>,
}

fn render_aggregation_prompt(corpus: &str, company_name: &str) -> String {
    format!(
        "Using only the page content below, produce a structured business-intelligence \
         record for \"{company_name}\". Fields you cannot support from the corpus must be \
         left at their default: strings default to empty/absent, lists default to [], \
         objects default to {{}}. Never invent facts not present in the corpus.\n\n\
         Respond with JSON only, matching this shape (all keys optional):\n\
         {{\"industry\": str, \"business_model\": str, \"target_market\": str, \"company_size\": str, \
         \"company_description\": str, \"value_proposition\": str, \"key_services\": [str], \
         \"competitive_advantages\": [str], \"tech_stack\": [str], \"pain_points\": [str], \
         \"location\": str, \"founding_year\": int, \"employee_count_range\": str, \
         \"company_culture\": str, \"funding_status\": str, \"leadership_team\": [str], \
         \"contact_email\": str, \"contact_phone\": str, \"contact_address\": str, \
         \"recent_news\": [str], \"certifications\": [str], \"partnerships\": [str], \"awards\": [str], \
         \"company_stage\": str, \"tech_sophistication\": str, \"business_model_type\": str, \
         \"geographic_scope\": str, \"decision_maker_type\": str, \"sales_complexity\": str, \
         \"has_job_listings\": bool, \"job_listings_count\": int, \"ai_summary\": str}}\n\n\
         Page content:\n{corpus}"
    )
}

/// Fuse `pages` into a partial [`CompanyRecord`] for `company_name`/`seed_url`.
///
/// On parse failure, the raw response (truncated) becomes `ai_summary` and
/// every structured field is left at its default; `scrape_status` is set to
/// `partial` either way pending the coordinator's final success check.
pub async fn aggregate<C: LlmClient>(
    llm: &C,
    pages: &[PageContent],
    company_name: &str,
    seed_url: &str,
    phase_timeout: Duration,
) -> CompanyRecord {
    let mut record = CompanyRecord::new(company_name, seed_url);
    let corpus = build_corpus(pages);

    if corpus.is_empty() {
        record.scrape_status = ScrapeStatus::Failed;
        record.scrape_error = Some("no usable page content to aggregate".to_string());
        return record;
    }

    let prompt = render_aggregation_prompt(&corpus, company_name);
    let options = CompletionOptions::json(phase_timeout).with_max_output_tokens(4096);

    match llm.complete(&prompt, &options).await {
        Ok(text) => match crate::gateway::parse_json_response::<AggregationResponse>(&text) {
            Ok(parsed) => {
                apply_response(&mut record, parsed);
                record.scrape_status = ScrapeStatus::Success;
            }
            Err(e) => {
                tracing::warn!(company = %company_name, error = %e, "aggregation response failed to parse, degrading to partial");
                record.ai_summary = Some(text.chars().take(2_000).collect());
                record.scrape_status = ScrapeStatus::Partial;
                record.scrape_error = Some(format!("aggregation parse failure: {e}"));
            }
        },
        Err(e) => {
            tracing::warn!(company = %company_name, error = %e, "aggregation LLM call failed");
            record.scrape_status = ScrapeStatus::Partial;
            record.scrape_error = Some(format!("aggregation call failure: {e}"));
        }
    }

    if !record.meets_success_invariant() && record.scrape_status == ScrapeStatus::Success {
        record.scrape_status = ScrapeStatus::Partial;
    }

    record
}

fn apply_response(record: &mut CompanyRecord, parsed: AggregationResponse) {
    record.industry = parsed.industry;
    record.business_model = parsed.business_model;
    record.target_market = parsed.target_market;
    record.company_size = parsed.company_size;
    record.company_description = parsed.company_description;
    record.value_proposition = parsed.value_proposition;
    record.key_services = parsed.key_services;
    record.competitive_advantages = parsed.competitive_advantages;
    record.tech_stack = parsed.tech_stack;
    record.pain_points = parsed.pain_points;
    record.leadership_team = parsed.leadership_team;
    record.recent_news = parsed.recent_news;
    record.certifications = parsed.certifications;
    record.partnerships = parsed.partnerships;
    record.awards = parsed.awards;
    record.location = parsed.location;
    record.founding_year = parsed.founding_year;
    record.employee_count_range = parsed.employee_count_range;
    record.company_culture = parsed.company_culture;
    record.funding_status = parsed.funding_status;
    record.contact_info = ContactInfo {
        email: parsed.contact_email,
        phone: parsed.contact_phone,
        address: parsed.contact_address,
    };
    record.company_stage = parsed.company_stage;
    record.tech_sophistication = parsed.tech_sophistication;
    record.business_model_type = parsed.business_model_type;
    record.geographic_scope = parsed.geographic_scope;
    record.decision_maker_type = parsed.decision_maker_type;
    record.sales_complexity = parsed.sales_complexity;
    record.has_job_listings = parsed.has_job_listings;
    record.job_listings_count = parsed.job_listings_count;
    record.ai_summary = parsed.ai_summary;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::{ExtractionError, Result};
    use crate::types::page::ContentKind;

    struct StaticLlm(String);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Err(ExtractionError::Provider("down".to_string()))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    fn sample_pages() -> Vec<PageContent> {
        vec![PageContent::new(
            "https://acme.test/about",
            ContentKind::Markdown,
            "Acme builds industrial robots for warehouse automation.",
        )]
    }

    #[tokio::test]
    async fn test_aggregate_success() {
        let llm = StaticLlm(
            "```json\n{\"industry\": \"Robotics\", \"ai_summary\": \"Acme builds robots.\"}\n```"
                .to_string(),
        );
        let record = aggregate(&llm, &sample_pages(), "Acme", "https://acme.test", Duration::from_secs(5)).await;
        assert_eq!(record.scrape_status, ScrapeStatus::Success);
        assert_eq!(record.industry.as_deref(), Some("Robotics"));
    }

    #[tokio::test]
    async fn test_aggregate_degrades_on_parse_failure() {
        let llm = StaticLlm("not json at all".to_string());
        let record = aggregate(&llm, &sample_pages(), "Acme", "https://acme.test", Duration::from_secs(5)).await;
        assert_eq!(record.scrape_status, ScrapeStatus::Partial);
        assert!(record.ai_summary.is_some());
    }

    #[tokio::test]
    async fn test_aggregate_empty_corpus_fails() {
        let empty_pages = vec![PageContent::empty("https://acme.test", "fetch failed")];
        let record = aggregate(&FailingLlm, &empty_pages, "Acme", "https://acme.test", Duration::from_secs(5)).await;
        assert_eq!(record.scrape_status, ScrapeStatus::Failed);
    }

    #[test]
    fn test_build_corpus_groups_by_page_type() {
        let pages = vec![
            PageContent::new("https://acme.test/about", ContentKind::Markdown, "about text"),
            PageContent::new("https://acme.test/careers", ContentKind::Markdown, "careers text"),
        ];
        let corpus = build_corpus(&pages);
        assert!(corpus.contains("## About"));
        assert!(corpus.contains("## Careers"));
    }

    #[test]
    fn test_build_corpus_truncates_to_budget() {
        let huge = "x".repeat(MAX_CORPUS_CHARS * 2);
        let pages = vec![PageContent::new("https://acme.test/about", ContentKind::Markdown, huge)];
        let corpus = build_corpus(&pages);
        assert!(corpus.len() <= MAX_CORPUS_CHARS);
    }
}
