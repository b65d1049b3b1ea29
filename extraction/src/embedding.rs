//! Embedding Service (C8) - canonical text rendering and vector production
//! for a [`CompanyRecord`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::company::CompanyRecord;

/// Anything that can turn text into a fixed-dimension dense vector.
///
/// Deliberately narrower than [`crate::gateway::LlmClient`]: embeddings and
/// completions are different provider operations, so this stays a separate
/// seam even when one concrete provider implements both.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Render a [`CompanyRecord`] into the canonical text used for embedding.
///
/// Concatenates labelled fields in a fixed order; absent fields contribute
/// nothing (no placeholder strings), mirroring the labelled-concatenation
/// pattern used for summary embedding text elsewhere in this crate.
pub fn canonical_text(record: &CompanyRecord) -> String {
    let mut parts = Vec::new();

    parts.push(format!("Name: {}", record.name));
    parts.push(format!("Website: {}", record.website));

    if let Some(v) = &record.industry {
        parts.push(format!("Industry: {v}"));
    }
    if let Some(v) = &record.business_model {
        parts.push(format!("Business model: {v}"));
    }
    if let Some(v) = &record.target_market {
        parts.push(format!("Target market: {v}"));
    }
    if let Some(v) = &record.company_size {
        parts.push(format!("Company size: {v}"));
    }
    if let Some(v) = &record.company_description {
        parts.push(format!("Description: {v}"));
    }
    if let Some(v) = &record.value_proposition {
        parts.push(format!("Value proposition: {v}"));
    }
    if !record.key_services.is_empty() {
        parts.push(format!("Key services: {}", record.key_services.join(", ")));
    }
    if !record.tech_stack.is_empty() {
        parts.push(format!("Tech stack: {}", record.tech_stack.join(", ")));
    }
    if let Some(v) = &record.location {
        parts.push(format!("Location: {v}"));
    }
    if let Some(v) = record.founding_year {
        parts.push(format!("Founded: {v}"));
    }
    if let Some(v) = &record.ai_summary {
        parts.push(format!("Summary: {v}"));
    }

    parts.join("\n")
}

/// Produce `record`'s embedding via `embedder`, over the canonical text
/// rendering. Returns `None` on embedding failure; the record is still
/// storable without a vector (C9 handles that case).
pub async fn embed_record<E: Embedder>(embedder: &E, record: &CompanyRecord) -> Option<Vec<f32>> {
    let text = canonical_text(record);
    if text.trim().is_empty() {
        return None;
    }
    match embedder.embed(&text).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            tracing::warn!(company = %record.name, error = %e, "embedding generation failed, record will be stored without a vector");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeterministicEmbedder;

    #[async_trait]
    impl Embedder for DeterministicEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(crate::error::ExtractionError::Embedding("provider down".to_string()))
        }
    }

    #[test]
    fn test_canonical_text_omits_absent_fields() {
        let record = CompanyRecord::new("Acme", "https://acme.test");
        let text = canonical_text(&record);
        assert!(text.contains("Name: Acme"));
        assert!(!text.contains("Industry:"));
    }

    #[test]
    fn test_canonical_text_includes_present_fields_in_order() {
        let mut record = CompanyRecord::new("Acme", "https://acme.test");
        record.industry = Some("Robotics".to_string());
        record.ai_summary = Some("Builds robots.".to_string());
        let text = canonical_text(&record);
        let industry_pos = text.find("Industry:").unwrap();
        let summary_pos = text.find("Summary:").unwrap();
        assert!(industry_pos < summary_pos);
    }

    #[tokio::test]
    async fn test_embed_record_deterministic_for_same_input() {
        let record = CompanyRecord::new("Acme", "https://acme.test");
        let embedder = DeterministicEmbedder;
        let a = embed_record(&embedder, &record).await.unwrap();
        let b = embed_record(&embedder, &record).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_embed_record_failure_returns_none() {
        let record = CompanyRecord::new("Acme", "https://acme.test");
        let result = embed_record(&FailingEmbedder, &record).await;
        assert!(result.is_none());
    }
}
