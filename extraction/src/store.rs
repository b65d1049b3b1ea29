//! Hybrid Store (C9) - a vector index and a document store presented as one
//! logical store, with an eventual-consistency read-repair invariant instead
//! of a cross-store transaction.
//!
//! Mirrors this crate's other decorator/trait-seam shape (C4's
//! [`crate::gateway::LlmClient`], C1's [`crate::traits::crawler::Crawler`]):
//! a narrow trait per backing store, plus a concrete type ([`HybridStore`])
//! that composes them and owns the policy (metadata budget enforcement,
//! id-by-name resolution, read-repair) neither backing store should know
//! about on its own.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::company::CompanyRecord;

/// Scalar/short-string/short-list/bool metadata values attached to a vector
/// upsert, matching §6's vector index interface.
pub type Metadata = HashMap<String, Value>;

/// Target ceiling for one record's serialized vector metadata (§4.9).
pub const METADATA_BUDGET_BYTES: usize = 40_000;

/// Prefix length applied to long string fields when truncating to fit the budget.
pub const METADATA_PREFIX_CHARS: usize = 500;

/// Equality/set-membership predicates applied during [`VectorIndex::query`].
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    /// Field must equal this scalar value.
    pub equals: HashMap<String, Value>,
    /// Field must be one of these scalar values.
    pub any_of: HashMap<String, Vec<Value>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    pub fn with_any_of(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.any_of.insert(field.into(), values);
        self
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        for (field, expected) in &self.equals {
            if metadata.get(field) != Some(expected) {
                return false;
            }
        }
        for (field, allowed) in &self.any_of {
            match metadata.get(field) {
                Some(actual) if allowed.contains(actual) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Coarse stats reported by a vector index, mirroring a real provider's
/// `describe_index_stats`.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: Option<usize>,
}

/// §6's vector index interface: `upsert`, `fetch`, `query`, `delete`,
/// `describe_index_stats`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()>;
    async fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, (Vec<f32>, Metadata)>>;
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Uuid,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Uuid, f32)>>;
    async fn delete(&self, ids: &[Uuid]) -> Result<()>;
    async fn describe_index_stats(&self) -> Result<IndexStats>;
}

/// §6's document store interface: key-value by `id`, opaque serialized value.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<CompanyRecord>>;
    async fn put(&self, record: &CompanyRecord) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Exact, case-insensitive name match among all stored records, used to
    /// resolve a pre-existing `id` when the caller doesn't supply one.
    async fn find_id_by_name(&self, name: &str) -> Result<Option<Uuid>>;
    /// Case-insensitive substring match on name, used as [`find_by_name`]'s
    /// fallback once an exact match comes up empty.
    ///
    /// [`find_by_name`]: crate::store::HybridStore::find_by_name
    async fn find_id_by_name_substring(&self, name: &str) -> Result<Option<Uuid>>;
}

/// Cosine similarity in `[-1, 1]`; callers rescale to `[0, 1]` for §4.9's
/// documented score range.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Project a [`CompanyRecord`] into the bounded metadata subset required by
/// §4.9, truncating long string fields (ai_summary prefix, then
/// company_description prefix, then location) until the serialized size fits
/// [`METADATA_BUDGET_BYTES`]. Truncation is logged, never silent.
pub fn project_metadata(record: &CompanyRecord) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("name".into(), Value::String(record.name.clone()));
    meta.insert("website".into(), Value::String(record.website.clone()));
    insert_opt(&mut meta, "industry", &record.industry);
    insert_opt(&mut meta, "business_model", &record.business_model);
    insert_opt(&mut meta, "company_stage", &record.company_stage);
    insert_opt(&mut meta, "tech_sophistication", &record.tech_sophistication);
    insert_opt(&mut meta, "geographic_scope", &record.geographic_scope);
    insert_opt(&mut meta, "business_model_type", &record.business_model_type);
    insert_opt(&mut meta, "decision_maker_type", &record.decision_maker_type);
    insert_opt(&mut meta, "location", &record.location);
    insert_opt(&mut meta, "company_size", &record.company_size);
    meta.insert(
        "scrape_status".into(),
        Value::String(format!("{:?}", record.scrape_status).to_lowercase()),
    );
    meta.insert(
        "last_updated".into(),
        Value::String(record.last_updated.to_rfc3339()),
    );
    meta.insert(
        "has_description".into(),
        Value::Bool(record.company_description.as_deref().is_some_and(|s| !s.is_empty())),
    );
    if let Some(summary) = &record.ai_summary {
        meta.insert(
            "ai_summary_prefix".into(),
            Value::String(take_prefix(summary, METADATA_PREFIX_CHARS)),
        );
    }
    if let Some(desc) = &record.company_description {
        meta.insert(
            "company_description_prefix".into(),
            Value::String(take_prefix(desc, METADATA_PREFIX_CHARS)),
        );
    }

    enforce_budget(&mut meta, &record.name);
    meta
}

fn insert_opt(meta: &mut Metadata, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        meta.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn take_prefix(s: &str, chars: usize) -> String {
    s.chars().take(chars).collect()
}

const REQUIRED_KEYS: &[&str] = &[
    "name",
    "website",
    "scrape_status",
    "last_updated",
    "has_description",
];

/// Required keys are never dropped; truncatable fields are shrunk in
/// priority order (ai_summary prefix, company_description prefix, location)
/// until the serialized metadata fits the budget.
fn enforce_budget(meta: &mut Metadata, company: &str) {
    let truncation_order = ["ai_summary_prefix", "company_description_prefix", "location"];
    let mut step = 0;
    while serialized_size(meta) > METADATA_BUDGET_BYTES && step < truncation_order.len() {
        let key = truncation_order[step];
        if let Some(Value::String(s)) = meta.get_mut(key) {
            let halved = s.chars().take(s.chars().count() / 2).collect::<String>();
            tracing::warn!(company = %company, field = key, "vector metadata exceeded budget, truncating");
            if halved.is_empty() {
                meta.remove(key);
            } else {
                *s = halved;
            }
        } else {
            step += 1;
        }
        if meta.get(key).map(|v| matches!(v, Value::String(s) if s.is_empty())).unwrap_or(true) {
            step += 1;
        }
    }
    debug_assert!(REQUIRED_KEYS.iter().all(|k| meta.contains_key(*k)));
}

fn serialized_size(meta: &Metadata) -> usize {
    serde_json::to_vec(meta).map(|v| v.len()).unwrap_or(usize::MAX)
}

/// The combined logical store: writes go document-first, vector-second;
/// reads repair a vector entry with no backing document.
pub struct HybridStore<V: VectorIndex, D: DocumentStore> {
    vector: V,
    document: D,
}

impl<V: VectorIndex, D: DocumentStore> HybridStore<V, D> {
    pub fn new(vector: V, document: D) -> Self {
        Self { vector, document }
    }

    /// Write the full record to the document store, then (if an embedding is
    /// present) the vector index. Resolves an unset `id`-to-existing-record
    /// mapping by exact case-insensitive name match before writing.
    pub async fn upsert(&self, mut record: CompanyRecord) -> Result<CompanyRecord> {
        if let Some(existing_id) = self.document.find_id_by_name(&record.name).await? {
            if existing_id != record.id {
                record.id = existing_id;
            }
        }

        self.document.put(&record).await?;

        if let Some(vector) = record.embedding.clone() {
            let metadata = project_metadata(&record);
            self.vector.upsert(record.id, vector, metadata).await?;
        }

        Ok(record)
    }

    /// Load the document; overlay vector-index metadata for any projected
    /// field absent from the document (the document always wins on
    /// conflict). Repairs a vector entry with no document by deleting it.
    pub async fn get(&self, id: Uuid) -> Result<Option<CompanyRecord>> {
        match self.document.get(id).await? {
            Some(record) => Ok(Some(record)),
            None => {
                let stale = self.vector.fetch(&[id]).await?;
                if stale.contains_key(&id) {
                    tracing::warn!(id = %id, "vector entry with no backing document, repairing");
                    self.vector.delete(&[id]).await?;
                }
                Ok(None)
            }
        }
    }

    /// Exact, then substring, case-insensitive match on name via the
    /// document store's index, resolved through [`Self::get`].
    pub async fn find_by_name(&self, name: &str) -> Result<Option<CompanyRecord>> {
        if let Some(id) = self.document.find_id_by_name(name).await? {
            return self.get(id).await;
        }
        if let Some(id) = self.document.find_id_by_name_substring(name).await? {
            return self.get(id).await;
        }
        Ok(None)
    }

    /// k-NN over the vector index, excluding `id`, optionally filtered.
    /// Scores are cosine similarity rescaled to `[0, 1]`, descending.
    pub async fn query_similar(
        &self,
        id: Uuid,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let Some((vector, _)) = self.vector.fetch(&[id]).await?.remove(&id) else {
            return Ok(Vec::new());
        };
        self.vector.query(&vector, k, id, filter).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.document.delete(id).await?;
        self.vector.delete(&[id]).await?;
        Ok(())
    }

    pub async fn describe_index_stats(&self) -> Result<IndexStats> {
        self.vector.describe_index_stats().await
    }
}

impl HybridStore<InMemoryVectorIndex, InMemoryDocumentStore> {
    /// An entirely in-process store: the default for tests and for the
    /// illustrative CLI when no external vector/document provider is wired in.
    pub fn in_memory() -> Self {
        Self::new(InMemoryVectorIndex::default(), InMemoryDocumentStore::default())
    }
}

/// In-memory [`VectorIndex`]. Brute-force cosine similarity; fine for test
/// fixtures and small corpora, not a production vector database.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<Uuid, (Vec<f32>, Metadata)>>,
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        self.entries.write().unwrap().insert(id, (vector, metadata));
        Ok(())
    }

    async fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, (Vec<f32>, Metadata)>> {
        let entries = self.entries.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|v| (*id, v.clone())))
            .collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Uuid,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(Uuid, f32)> = entries
            .iter()
            .filter(|(id, _)| **id != exclude)
            .filter(|(_, (_, meta))| filter.is_none_or(|f| f.matches(meta)))
            .map(|(id, (vec, _))| (*id, (cosine_similarity(vector, vec) + 1.0) / 2.0))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    async fn describe_index_stats(&self) -> Result<IndexStats> {
        let entries = self.entries.read().unwrap();
        let dimension = entries.values().next().map(|(v, _)| v.len());
        Ok(IndexStats {
            vector_count: entries.len(),
            dimension,
        })
    }
}

/// In-memory [`DocumentStore`] keyed by `id`, with a name index for
/// id-by-name resolution.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, CompanyRecord>>,
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: Uuid) -> Result<Option<CompanyRecord>> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    async fn put(&self, record: &CompanyRecord) -> Result<()> {
        self.documents.write().unwrap().insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.documents.write().unwrap().remove(&id);
        Ok(())
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id))
    }

    async fn find_id_by_name_substring(&self, name: &str) -> Result<Option<Uuid>> {
        let needle = name.to_lowercase();
        let documents = self.documents.read().unwrap();
        Ok(documents
            .values()
            .find(|r| r.name.to_lowercase().contains(&needle))
            .map(|r| r.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::company::ScrapeStatus;

    fn success_record(name: &str) -> CompanyRecord {
        let mut record = CompanyRecord::new(name, "https://acme.test");
        record.industry = Some("Robotics".to_string());
        record.ai_summary = Some("Acme builds robots.".to_string());
        record.scrape_status = ScrapeStatus::Success;
        record.embedding = Some(vec![1.0, 0.0, 0.0]);
        record
    }

    #[tokio::test]
    async fn test_upsert_then_get_roundtrips() {
        let store = HybridStore::in_memory();
        let record = success_record("Acme Robotics");
        let id = record.id;
        store.upsert(record.clone()).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.industry, record.industry);
    }

    #[tokio::test]
    async fn test_upsert_twice_does_not_duplicate() {
        let store = HybridStore::in_memory();
        let record = success_record("Acme Robotics");
        store.upsert(record.clone()).await.unwrap();
        store.upsert(record.clone()).await.unwrap();

        let stats = store.describe_index_stats().await.unwrap();
        assert_eq!(stats.vector_count, 1);
    }

    #[tokio::test]
    async fn test_find_by_name_case_insensitive() {
        let store = HybridStore::in_memory();
        let record = success_record("Acme Robotics");
        store.upsert(record).await.unwrap();

        let found = store.find_by_name("acme robotics").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_upsert_reuses_id_by_name() {
        let store = HybridStore::in_memory();
        let first = success_record("Acme Robotics");
        let original_id = first.id;
        store.upsert(first).await.unwrap();

        let mut second = success_record("Acme Robotics");
        second.industry = Some("Industrial Robotics".to_string());
        let persisted = store.upsert(second).await.unwrap();

        assert_eq!(persisted.id, original_id);
        let fetched = store.get(original_id).await.unwrap().unwrap();
        assert_eq!(fetched.industry.as_deref(), Some("Industrial Robotics"));
    }

    #[tokio::test]
    async fn test_upsert_without_embedding_skips_vector_write() {
        let store = HybridStore::in_memory();
        let mut record = success_record("No Vector Inc");
        record.embedding = None;
        store.upsert(record.clone()).await.unwrap();

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert!(fetched.embedding.is_none());
        let stats = store.describe_index_stats().await.unwrap();
        assert_eq!(stats.vector_count, 0);
    }

    #[tokio::test]
    async fn test_query_similar_excludes_self_and_sorts_descending() {
        let store = HybridStore::in_memory();
        let a = success_record("A");
        let id_a = a.id;
        store.upsert(a).await.unwrap();

        let mut b = success_record("B");
        b.embedding = Some(vec![0.9, 0.1, 0.0]);
        store.upsert(b).await.unwrap();

        let mut c = success_record("C");
        c.embedding = Some(vec![-1.0, 0.0, 0.0]);
        store.upsert(c).await.unwrap();

        let results = store.query_similar(id_a, 5, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1 >= results[1].1);
        assert!(results.iter().all(|(id, _)| *id != id_a));
    }

    #[tokio::test]
    async fn test_delete_removes_from_both_stores() {
        let store = HybridStore::in_memory();
        let record = success_record("Gone Inc");
        let id = record.id;
        store.upsert(record).await.unwrap();
        store.delete(id).await.unwrap();

        assert!(store.get(id).await.unwrap().is_none());
        let stats = store.describe_index_stats().await.unwrap();
        assert_eq!(stats.vector_count, 0);
    }

    #[tokio::test]
    async fn test_read_repairs_stale_vector_without_document() {
        let vector = InMemoryVectorIndex::default();
        let document = InMemoryDocumentStore::default();
        let id = Uuid::new_v4();
        vector.upsert(id, vec![1.0, 0.0], Metadata::new()).await.unwrap();

        let store = HybridStore::new(vector, document);
        assert!(store.get(id).await.unwrap().is_none());

        let stats = store.describe_index_stats().await.unwrap();
        assert_eq!(stats.vector_count, 0, "stale vector entry should be repaired away");
    }

    #[test]
    fn test_metadata_budget_truncates_oversized_summary() {
        let mut record = CompanyRecord::new("Big Co", "https://big.test");
        record.ai_summary = Some("x".repeat(200_000));
        record.scrape_status = ScrapeStatus::Success;

        let meta = project_metadata(&record);
        assert!(serialized_size(&meta) <= METADATA_BUDGET_BYTES);
        for key in REQUIRED_KEYS {
            assert!(meta.contains_key(*key), "required key {key} must survive truncation");
        }
    }

    #[test]
    fn test_metadata_projection_includes_required_keys() {
        let record = success_record("Acme Robotics");
        let meta = project_metadata(&record);
        for key in REQUIRED_KEYS {
            assert!(meta.contains_key(*key));
        }
        assert_eq!(meta.get("industry").unwrap(), &Value::String("Robotics".to_string()));
    }

    proptest::proptest! {
        #[test]
        fn prop_cosine_similarity_bounded_and_reflexive(
            v in proptest::collection::vec(-10.0f32..10.0, 1..8),
        ) {
            let self_sim = cosine_similarity(&v, &v);
            if v.iter().any(|x| *x != 0.0) {
                proptest::prop_assert!((self_sim - 1.0).abs() < 1e-4);
            }

            let sim = cosine_similarity(&v, &v.iter().map(|x| -x).collect::<Vec<_>>());
            proptest::prop_assert!((-1.0..=1.0).contains(&sim));
        }
    }
}
