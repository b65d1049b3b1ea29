//! PostgreSQL-backed [`DocumentStore`] and [`VectorIndex`] (C9).
//!
//! Production backend for multi-process deployments. Vectors are stored as
//! JSON-encoded `Vec<f32>` text alongside the row rather than via the
//! `pgvector` extension, so this works against a stock Postgres instance;
//! `query` scores candidates by brute-force cosine similarity in Rust. A
//! deployment that needs ANN search at scale should add a pgvector column
//! and an HNSW index on top of this schema - the trait boundary doesn't
//! change either way.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::store::{cosine_similarity, DocumentStore, IndexStats, Metadata, MetadataFilter, VectorIndex};
use crate::types::company::CompanyRecord;

/// Combined document-store-plus-vector-index backend over one Postgres database.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS company_documents (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                record_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_company_documents_name ON company_documents (lower(name));")
            .execute(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS company_vectors (
                id UUID PRIMARY KEY,
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
impl DocumentStore for PostgresStore {
    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<CompanyRecord>> {
        let row = sqlx::query("SELECT record_json FROM company_documents WHERE id = $1")
            .bind(id)
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

    #[instrument(skip(self, record))]
    async fn put(&self, record: &CompanyRecord) -> Result<()> {
        let json = serde_json::to_string(record).map_err(ExtractionError::JsonParse)?;
        sqlx::query(
            "INSERT INTO company_documents (id, name, record_json) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, record_json = EXCLUDED.record_json",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM company_documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM company_documents WHERE lower(name) = lower($1) LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        match row {
            Some(row) => Ok(Some(row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_id_by_name_substring(&self, name: &str) -> Result<Option<Uuid>> {
        let pattern = format!("%{}%", name.replace('%', "\\%").replace('_', "\\_"));
        let row = sqlx::query("SELECT id FROM company_documents WHERE lower(name) LIKE lower($1) ESCAPE '\\' LIMIT 1")
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        match row {
            Some(row) => Ok(Some(row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VectorIndex for PostgresStore {
    #[instrument(skip(self, vector, metadata))]
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        let vector_json = serde_json::to_string(&vector).map_err(ExtractionError::JsonParse)?;
        let metadata_json = serde_json::to_string(&metadata).map_err(ExtractionError::JsonParse)?;
        sqlx::query(
            "INSERT INTO company_vectors (id, vector_json, metadata_json) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET vector_json = EXCLUDED.vector_json, metadata_json = EXCLUDED.metadata_json",
        )
        .bind(id)
        .bind(vector_json)
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    async fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, (Vec<f32>, Metadata)>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, vector_json, metadata_json FROM company_vectors WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let mut result = HashMap::new();
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let vector_json: String = row.try_get("vector_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let metadata_json: String = row.try_get("metadata_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let vector: Vec<f32> = serde_json::from_str(&vector_json).map_err(ExtractionError::JsonParse)?;
            let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(ExtractionError::JsonParse)?;
            result.insert(id, (vector, metadata));
        }
        Ok(result)
    }

    #[instrument(skip(self, vector, filter))]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Uuid,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let rows = sqlx::query("SELECT id, vector_json, metadata_json FROM company_vectors WHERE id != $1")
            .bind(exclude)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;

        let mut scored: Vec<(Uuid, f32)> = Vec::new();
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let vector_json: String = row.try_get("vector_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
            let candidate: Vec<f32> = serde_json::from_str(&vector_json).map_err(ExtractionError::JsonParse)?;

            if let Some(filter) = filter {
                let metadata_json: String = row.try_get("metadata_json").map_err(|e| ExtractionError::Storage(Box::new(e)))?;
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
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM company_vectors WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
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

// Exercised against a real Postgres instance only; no unit tests run against
// a live database here. Coverage for the DocumentStore/VectorIndex contract
// lives in `stores::sqlite` and `store::tests`, which run against the exact
// same trait surface.
