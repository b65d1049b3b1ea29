//! SQLite-backed [`DocumentStore`] and [`VectorIndex`] (C9).
//!
//! A file-based backend for local development and single-process
//! deployments. Vectors are stored as JSON-encoded `Vec<f32>` blobs and
//! scored by brute-force cosine similarity in Rust - SQLite has no native
//! vector index, so `query` pays an `O(n)` scan over the vectors table.
//! Fine up to a few thousand companies; swap for [`super::postgres::PostgresStore`]
//! beyond that.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::store::{cosine_similarity, DocumentStore, IndexStats, Metadata, MetadataFilter, VectorIndex};
use crate::types::company::CompanyRecord;

/// Combined document-store-plus-vector-index backend over one SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `database_url` examples: `sqlite::memory:`, `sqlite:./theodore.db`.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS company_documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                record_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_company_documents_name ON company_documents(name);

            CREATE TABLE IF NOT EXISTS company_vectors (
                id TEXT PRIMARY KEY,
                vector_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, id: Uuid) -> Result<Option<CompanyRecord>> {
        let row = sqlx::query("SELECT record_json FROM company_documents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        match row {
            Some(row) => {
                let json: String = row.try_get("record_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
                let record = serde_json::from_str(&json).map_err(ExtractionError::JsonParse)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, record: &CompanyRecord) -> Result<()> {
        let json = serde_json::to_string(record).map_err(ExtractionError::JsonParse)?;
        sqlx::query(
            "INSERT INTO company_documents (id, name, record_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, record_json = excluded.record_json",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM company_documents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM company_documents WHERE name = ?1 COLLATE NOCASE LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        match row {
            Some(row) => {
                let id: String = row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
                Ok(Uuid::parse_str(&id).ok())
            }
            None => Ok(None),
        }
    }

    async fn find_id_by_name_substring(&self, name: &str) -> Result<Option<Uuid>> {
        let pattern = format!("%{}%", name.replace('%', "\\%").replace('_', "\\_"));
        let row = sqlx::query(
            "SELECT id FROM company_documents WHERE name LIKE ?1 ESCAPE '\\' COLLATE NOCASE LIMIT 1",
        )
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        match row {
            Some(row) => {
                let id: String = row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
                Ok(Uuid::parse_str(&id).ok())
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        let vector_json = serde_json::to_string(&vector).map_err(ExtractionError::JsonParse)?;
        let metadata_json = serde_json::to_string(&metadata).map_err(ExtractionError::JsonParse)?;
        sqlx::query(
            "INSERT INTO company_vectors (id, vector_json, metadata_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET vector_json = excluded.vector_json, metadata_json = excluded.metadata_json",
        )
        .bind(id.to_string())
        .bind(vector_json)
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    async fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, (Vec<f32>, Metadata)>> {
        let mut result = HashMap::new();
        for id in ids {
            let row = sqlx::query("SELECT vector_json, metadata_json FROM company_vectors WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            if let Some(row) = row {
                let vector_json: String = row.try_get("vector_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
                let metadata_json: String = row.try_get("metadata_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
                let vector: Vec<f32> = serde_json::from_str(&vector_json).map_err(ExtractionError::JsonParse)?;
                let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(ExtractionError::JsonParse)?;
                result.insert(*id, (vector, metadata));
            }
        }
        Ok(result)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Uuid,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let rows = sqlx::query("SELECT id, vector_json, metadata_json FROM company_vectors")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let mut scored: Vec<(Uuid, f32)> = Vec::new();
        for row in rows {
            let id_str: String = row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let Ok(id) = Uuid::parse_str(&id_str) else { continue };
            if id == exclude {
                continue;
            }
            let vector_json: String = row.try_get("vector_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let metadata_json: String = row.try_get("metadata_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let candidate: Vec<f32> = serde_json::from_str(&vector_json).map_err(ExtractionError::JsonParse)?;

            if let Some(filter) = filter {
                let metadata: HashMap<String, Value> =
                    serde_json::from_str(&metadata_json).map_err(ExtractionError::JsonParse)?;
                if !filter_matches(filter, &metadata) {
                    continue;
                }
            }

            scored.push((id, (cosine_similarity(vector, &candidate) + 1.0) / 2.0));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM company_vectors WHERE id = ?1")
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        }
        Ok(())
    }

    async fn describe_index_stats(&self) -> Result<IndexStats> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM company_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        let count: i64 = row.try_get("count").map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let dimension = sqlx::query("SELECT vector_json FROM company_vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?
            .and_then(|row| row.try_get::<String, _>("vector_json").ok())
            .and_then(|json| serde_json::from_str::<Vec<f32>>(&json).ok())
            .map(|v| v.len());

        Ok(IndexStats {
            vector_count: count as usize,
            dimension,
        })
    }
}

fn filter_matches(filter: &MetadataFilter, metadata: &HashMap<String, Value>) -> bool {
    for (field, expected) in &filter.equals {
        if metadata.get(field) != Some(expected) {
            return false;
        }
    }
    for (field, allowed) in &filter.any_of {
        match metadata.get(field) {
            Some(actual) if allowed.contains(actual) => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HybridStore;
    use crate::types::company::ScrapeStatus;

    async fn new_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn success_record(name: &str) -> CompanyRecord {
        let mut record = CompanyRecord::new(name, "https://acme.test");
        record.industry = Some("Robotics".to_string());
        record.ai_summary = Some("Acme builds robots.".to_string());
        record.scrape_status = ScrapeStatus::Success;
        record.embedding = Some(vec![1.0, 0.0, 0.0]);
        record
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let store = new_store().await;
        let record = success_record("Acme Robotics");
        store.put(&record).await.unwrap();
        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Acme Robotics");
        assert_eq!(fetched.industry, record.industry);
    }

    #[tokio::test]
    async fn test_find_id_by_name_case_insensitive() {
        let store = new_store().await;
        let record = success_record("Acme Robotics");
        store.put(&record).await.unwrap();
        let found = store.find_id_by_name("acme robotics").await.unwrap();
        assert_eq!(found, Some(record.id));
    }

    #[tokio::test]
    async fn test_vector_upsert_and_query() {
        let store = new_store().await;
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        store.upsert(id_a, vec![1.0, 0.0, 0.0], Metadata::new()).await.unwrap();
        store.upsert(id_b, vec![0.0, 1.0, 0.0], Metadata::new()).await.unwrap();

        let results = store.query(&[1.0, 0.0, 0.0], 5, Uuid::nil(), None).await.unwrap();
        assert_eq!(results[0].0, id_a);
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_vector() {
        let store = new_store().await;
        let record = success_record("Gone Inc");
        store.put(&record).await.unwrap();
        store.upsert(record.id, vec![1.0, 0.0], Metadata::new()).await.unwrap();

        DocumentStore::delete(&store, record.id).await.unwrap();
        VectorIndex::delete(&store, &[record.id]).await.unwrap();

        assert!(store.get(record.id).await.unwrap().is_none());
        let stats = store.describe_index_stats().await.unwrap();
        assert_eq!(stats.vector_count, 0);
    }

    #[tokio::test]
    async fn test_works_as_hybrid_store_backend() {
        let store = new_store().await;
        let hybrid = HybridStore::new(store, new_store().await);
        let record = success_record("Acme Robotics");
        let id = record.id;
        hybrid.upsert(record).await.unwrap();
        assert!(hybrid.get(id).await.unwrap().is_some());
    }
}
