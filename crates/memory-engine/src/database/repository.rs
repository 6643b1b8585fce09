use async_trait::async_trait;
use pgvector::Vector;
use sqlx::types::Json;
use tracing::debug;

use super::{DbPool, VectorRow};
use crate::services::memory::providers::{MetadataFilter, VectorDatabase, VectorMatch, VectorRecord};
use crate::utils::error::MemoryError;

/// pgvector-backed collection. Every collection lives in the shared
/// `memory_vectors` table, partitioned by the `collection` column.
pub struct PgVectorRepository {
    pool: DbPool,
    collection: String,
}

impl PgVectorRepository {
    pub fn new(pool: DbPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl VectorDatabase for PgVectorRepository {
    async fn upsert(&self, record: VectorRecord) -> Result<(), MemoryError> {
        sqlx::query(
            r#"INSERT INTO memory_vectors (collection, id, embedding, metadata, document, updated_at)
               VALUES ($1, $2, $3, $4, $5, now())
               ON CONFLICT (collection, id) DO UPDATE SET
                   embedding = EXCLUDED.embedding,
                   metadata = EXCLUDED.metadata,
                   document = EXCLUDED.document,
                   updated_at = now()"#,
        )
        .bind(&self.collection)
        .bind(&record.id)
        .bind(Vector::from(record.embedding))
        .bind(Json(&record.metadata))
        .bind(&record.document)
        .execute(self.pool.get_pool())
        .await?;

        debug!("Upserted {} into {}", record.id, self.collection);
        Ok(())
    }

    /// Nearest neighbours by cosine distance (`<=>`), best first
    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        let rows = sqlx::query_as::<_, VectorRow>(
            r#"SELECT
                id,
                document,
                metadata,
                (embedding <=> $1)::float4 AS distance
               FROM memory_vectors
               WHERE collection = $2 AND metadata @> $3
               ORDER BY embedding <=> $1
               LIMIT $4"#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(&self.collection)
        .bind(Json(filter.as_json()))
        .bind(i64::try_from(k).unwrap_or(i64::MAX))
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} neighbours in {}", rows.len(), self.collection);
        Ok(rows.into_iter().map(VectorMatch::from).collect())
    }

    async fn get(
        &self,
        filter: &MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        // LIMIT NULL means no limit
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows = sqlx::query_as::<_, VectorRow>(
            r#"SELECT
                id,
                document,
                metadata,
                0::float4 AS distance
               FROM memory_vectors
               WHERE collection = $1 AND metadata @> $2
               ORDER BY updated_at
               LIMIT $3"#,
        )
        .bind(&self.collection)
        .bind(Json(filter.as_json()))
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(VectorMatch::from).collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM memory_vectors WHERE collection = $1 AND metadata @> $2")
            .bind(&self.collection)
            .bind(Json(filter.as_json()))
            .execute(self.pool.get_pool())
            .await?;

        debug!("Deleted {} rows from {}", result.rows_affected(), self.collection);
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        sqlx::query("SELECT id FROM memory_vectors WHERE collection = $1 LIMIT 1")
            .bind(&self.collection)
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(())
    }
}
