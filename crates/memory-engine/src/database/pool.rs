use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(&config.url)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Connected to PostgreSQL (max {} connections)", config.pool_max_size);

        Ok(Self { pool })
    }

    /// Create the pgvector extension and the shared vector table.
    /// Idempotent; the embedding column is fixed to `dimension`.
    pub async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let create_table = format!(
            r#"CREATE TABLE IF NOT EXISTS memory_vectors (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                document TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )"#,
            dimension
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS memory_vectors_metadata_idx \
             ON memory_vectors USING gin (metadata jsonb_path_ops)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS memory_vectors_embedding_idx \
             ON memory_vectors USING hnsw (embedding vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await?;

        info!("Vector schema ready (dimension {})", dimension);
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
