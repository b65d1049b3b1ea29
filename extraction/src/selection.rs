//! Page Selector (C5) - pick the highest-value subset of a discovery set
//! for extraction, via the LLM gateway with a heuristic fallback.

use std::time::Duration;

use serde::Deserialize;

use crate::gateway::{CompletionOptions, LlmClient};

/// Candidate truncation cap: bounds the selection prompt's size regardless
/// of how large the discovery set is.
pub const MAX_CANDIDATES: usize = 25;

/// Hard cap on how many pages the selector may return, independent of
/// whatever `k_target` the caller asks for.
pub const MAX_SELECTED: usize = 50;

const KEYWORD_WEIGHTS: &[(&str, i32)] = &[
    ("contact", 10),
    ("about", 9),
    ("team", 8),
    ("leadership", 8),
    ("careers", 7),
    ("jobs", 7),
    ("company", 6),
    ("services", 5),
    ("products", 5),
    ("history", 4),
    ("our-story", 4),
];

#[derive(Deserialize)]
struct SelectionResponse {
    urls: Vec<String>,
}

fn render_selection_prompt(candidates: &[String], company_name: &str, k_target: usize) -> String {
    let listed = candidates
        .iter()
        .enumerate()
        .map(|(i, url)| format!("{}. {}", i + 1, url))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are selecting the most informative pages to research the company \"{company_name}\".\n\
         From the URLs below, choose up to {k_target} pages that together are most likely to cover: \
         contact/location, founding year, employee count, leadership, products/services, \
         partnerships, certifications, and recent news.\n\n\
         URLs:\n{listed}\n\n\
         Respond with JSON only: {{\"urls\": [\"...\"]}}. Only include URLs from the list above."
    )
}

/// Score a single candidate path by keyword presence, homepage bonus included.
fn heuristic_score(url: &str, is_homepage: bool) -> i32 {
    let mut score = 0;
    let lower = url.to_lowercase();
    for (keyword, weight) in KEYWORD_WEIGHTS {
        if lower.contains(keyword) {
            score += weight;
        }
    }
    if is_homepage {
        score += 100;
    }
    score
}

fn looks_like_homepage(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| matches!(u.path(), "" | "/"))
        .unwrap_or(false)
}

/// Rank `candidates` by [`heuristic_score`], stable by insertion order, and
/// take the top `k_target`.
pub fn heuristic_select(candidates: &[String], k_target: usize) -> Vec<String> {
    let mut scored: Vec<(usize, i32, &String)> = candidates
        .iter()
        .enumerate()
        .map(|(i, url)| (i, heuristic_score(url, looks_like_homepage(url)), url))
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .take(k_target.min(MAX_SELECTED))
        .map(|(_, _, url)| url.clone())
        .collect()
}

/// Outcome of a [`select`] call: the chosen URLs plus whether the heuristic
/// fallback had to activate, so the caller can reflect that in JobProgress.
pub struct SelectionOutcome {
    pub urls: Vec<String>,
    pub used_fallback: bool,
}

/// Select the subset of `candidates` (a discovery set's URLs, already
/// capped by the caller if larger than [`MAX_CANDIDATES`]) worth extracting.
///
/// Falls back to [`heuristic_select`] on any LLM failure: timeout, transport
/// error, or a response that doesn't parse as the expected JSON shape.
pub async fn select<C: LlmClient>(
    llm: &C,
    candidates: &[String],
    company_name: &str,
    k_target: usize,
    phase_timeout: Duration,
) -> SelectionOutcome {
    if candidates.is_empty() {
        return SelectionOutcome { urls: Vec::new(), used_fallback: false };
    }

    let truncated: Vec<String> = candidates.iter().take(MAX_CANDIDATES).cloned().collect();
    let prompt = render_selection_prompt(&truncated, company_name, k_target);
    let options = CompletionOptions::json(phase_timeout);

    match llm.complete(&prompt, &options).await {
        Ok(text) => match crate::gateway::parse_json_response::<SelectionResponse>(&text) {
            Ok(parsed) => {
                let selected: Vec<String> = parsed
                    .urls
                    .into_iter()
                    .filter(|u| truncated.contains(u))
                    .take(k_target.min(MAX_SELECTED))
                    .collect();
                if selected.is_empty() {
                    tracing::warn!(company = %company_name, "page selector returned no valid URLs, falling back to heuristic");
                    SelectionOutcome { urls: heuristic_select(&truncated, k_target), used_fallback: true }
                } else {
                    SelectionOutcome { urls: selected, used_fallback: false }
                }
            }
            Err(e) => {
                tracing::warn!(company = %company_name, error = %e, "page selector response failed to parse, falling back to heuristic");
                SelectionOutcome { urls: heuristic_select(&truncated, k_target), used_fallback: true }
            }
        },
        Err(e) => {
            tracing::warn!(company = %company_name, error = %e, "page selector LLM call failed, falling back to heuristic");
            SelectionOutcome { urls: heuristic_select(&truncated, k_target), used_fallback: true }
        }
    }
}
