//! `CompanyRecord` - the structured intelligence artifact produced by a
//! research run and persisted to the hybrid store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of a research run, recorded on the record it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    /// Every phase completed and the aggregator produced a grounded summary.
    Success,
    /// At least one phase degraded (heuristic fallback, parse failure,
    /// partial extraction) but a usable record was still produced.
    Partial,
    /// The run could not produce a usable record.
    Failed,
}

impl Default for ScrapeStatus {
    fn default() -> Self {
        Self::Failed
    }
}

/// Contact details, kept as a small struct rather than loose optional
/// fields on `CompanyRecord` so it can be omitted as a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.address.is_none()
    }
}

/// The structured business-intelligence record for one company.
///
/// `id`, `name`, `website`, `created_at`, and `pages_crawled` are always set
/// by the research coordinator regardless of what the aggregation model
/// returns; every other field defaults to empty/absent and is filled in
/// best-effort by the aggregator (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Stable identifier, reused across re-research runs for the same company.
    pub id: Uuid,
    pub name: String,
    pub website: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_market: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,

    #[serde(default)]
    pub key_services: Vec<String>,
    #[serde(default)]
    pub competitive_advantages: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub leadership_team: Vec<String>,
    #[serde(default)]
    pub recent_news: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub partnerships: Vec<String>,
    #[serde(default)]
    pub awards: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founding_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_culture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_status: Option<String>,

    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub social_media: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_sophistication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographic_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_maker_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_complexity: Option<String>,

    #[serde(default)]
    pub has_job_listings: bool,
    #[serde(default)]
    pub job_listings_count: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,

    /// URLs actually used to build this record, a subset of the run's
    /// discovery set.
    #[serde(default)]
    pub pages_crawled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_duration_ms: Option<u64>,

    pub scrape_status: ScrapeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    /// Dense embedding over the canonical text rendering (C8). Absent until
    /// the embedding phase has run successfully at least once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CompanyRecord {
    /// Start a new record for a company about to be researched.
    ///
    /// Only the caller-known facts are set; everything else is the
    /// aggregator's job to fill in.
    pub fn new(name: impl Into<String>, website: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            website: website.into(),
            industry: None,
            business_model: None,
            target_market: None,
            company_size: None,
            company_description: None,
            value_proposition: None,
            key_services: Vec::new(),
            competitive_advantages: Vec::new(),
            tech_stack: Vec::new(),
            pain_points: Vec::new(),
            leadership_team: Vec::new(),
            recent_news: Vec::new(),
            certifications: Vec::new(),
            partnerships: Vec::new(),
            awards: Vec::new(),
            location: None,
            founding_year: None,
            employee_count_range: None,
            company_culture: None,
            funding_status: None,
            contact_info: ContactInfo::default(),
            social_media: HashMap::new(),
            company_stage: None,
            tech_sophistication: None,
            business_model_type: None,
            geographic_scope: None,
            decision_maker_type: None,
            sales_complexity: None,
            has_job_listings: false,
            job_listings_count: 0,
            ai_summary: None,
            pages_crawled: Vec::new(),
            crawl_duration_ms: None,
            scrape_status: ScrapeStatus::Failed,
            scrape_error: None,
            created_at: now,
            last_updated: now,
            embedding: None,
        }
    }

    /// Reuse an existing id (id-reuse-by-name: a later run for the same
    /// company replaces rather than duplicates).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Whether this record satisfies the success invariant: a non-empty
    /// summary plus at least one of industry/business_model/description.
    pub fn meets_success_invariant(&self) -> bool {
        self.ai_summary.as_deref().is_some_and(|s| !s.is_empty())
            && (self.industry.is_some() || self.business_model.is_some() || self.company_description.is_some())
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = CompanyRecord::new("Acme Robotics", "https://acme.test");
        assert_eq!(record.name, "Acme Robotics");
        assert_eq!(record.scrape_status, ScrapeStatus::Failed);
        assert!(record.pages_crawled.is_empty());
        assert!(record.embedding.is_none());
    }

    #[test]
    fn test_success_invariant() {
        let mut record = CompanyRecord::new("Acme", "https://acme.test");
        assert!(!record.meets_success_invariant());
        record.ai_summary = Some("Acme builds robots.".to_string());
        assert!(!record.meets_success_invariant());
        record.industry = Some("Robotics".to_string());
        assert!(record.meets_success_invariant());
    }

    #[test]
    fn test_with_id_reuses_identity() {
        let existing = Uuid::new_v4();
        let record = CompanyRecord::new("Acme", "https://acme.test").with_id(existing);
        assert_eq!(record.id, existing);
    }
}
