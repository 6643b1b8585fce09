use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::providers::{EmbeddingProvider, HealthFlag, MetadataFilter, VectorDatabase, VectorRecord};
use crate::models::{JsonMap, KnowledgeHit, StoredVector};
use crate::utils::error::MemoryError;
use crate::utils::similarity::round2;

pub const KNOWLEDGE_COLLECTION: &str = "knowledge_base";
pub const DEFAULT_KNOWLEDGE_THRESHOLD: f32 = 0.7;

const ORGANIZATION_FIELD: &str = "organizationId";

/// Organization-scoped reference texts, searched by embedding similarity.
pub struct KnowledgeBase {
    collection: Arc<dyn VectorDatabase>,
    embeddings: Arc<dyn EmbeddingProvider>,
    health: HealthFlag,
}

impl KnowledgeBase {
    pub fn new(collection: Arc<dyn VectorDatabase>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            collection,
            embeddings,
            health: HealthFlag::new(),
        }
    }

    /// Embed `text` and add it with the caller's metadata under a fresh
    /// `vec-` id.
    pub async fn add(&self, text: &str, metadata: JsonMap) -> Result<StoredVector, MemoryError> {
        let id = format!("vec-{}", Uuid::new_v4());
        let outcome = self.embeddings.embed(text).await;
        if let Some(reason) = outcome.reason() {
            warn!("Adding knowledge entry {} with a zero embedding: {}", id, reason);
        }
        let embedding = outcome.into_inner();
        let dimensions = embedding.len();

        self.health.track(
            self.collection
                .upsert(VectorRecord {
                    id: id.clone(),
                    embedding,
                    metadata,
                    document: text.to_string(),
                })
                .await,
        )?;

        info!("Stored knowledge entry {} ({} dimensions)", id, dimensions);
        Ok(StoredVector {
            id,
            status: "stored".to_string(),
            dimensions,
        })
    }

    /// Up to `limit` entries of `organization_id`, nearest first, dropping
    /// those whose relevance falls below `threshold`.
    pub async fn search(
        &self,
        query: &str,
        organization_id: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeHit>, MemoryError> {
        let outcome = self.embeddings.embed(query).await;
        if let Some(reason) = outcome.reason() {
            warn!("Knowledge search with a zero query embedding: {}", reason);
        }

        let filter = MetadataFilter::new().eq(ORGANIZATION_FIELD, organization_id);
        let matches = self.health.track(
            self.collection
                .query(outcome.value(), &filter, limit)
                .await,
        )?;

        let hits: Vec<KnowledgeHit> = matches
            .into_iter()
            .filter_map(|m| {
                let relevance = 1.0 - m.distance;
                if relevance < threshold {
                    return None;
                }
                let text = |name: &str| m.metadata.get(name).and_then(Value::as_str).map(str::to_string);
                Some(KnowledgeHit {
                    title: text("title").unwrap_or_else(|| "Untitled".to_string()),
                    source: text("source").unwrap_or_else(|| KNOWLEDGE_COLLECTION.to_string()),
                    url: text("url"),
                    id: m.id,
                    content: m.document,
                    relevance: round2(relevance),
                })
            })
            .collect();

        debug!(
            "Knowledge search for organization {} returned {} hits",
            organization_id,
            hits.len()
        );
        Ok(hits)
    }

    pub async fn is_healthy(&self) -> bool {
        let healthy = self.collection.ping().await.is_ok();
        self.health.set(healthy);
        healthy
    }
}
