use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::models::{JsonMap, KnowledgeHit, StoredVector};
use crate::services::memory::knowledge::DEFAULT_KNOWLEDGE_THRESHOLD;
use crate::services::memory::KnowledgeBase;
use crate::utils::error::ApiError;

const DEFAULT_KNOWLEDGE_LIMIT: usize = 5;
const MAX_KNOWLEDGE_LIMIT: usize = 50;

fn default_limit() -> usize {
    DEFAULT_KNOWLEDGE_LIMIT
}

fn default_threshold() -> f32 {
    DEFAULT_KNOWLEDGE_THRESHOLD
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSearchRequest {
    pub query: String,
    pub organization_id: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeSearchResponse {
    pub results: Vec<KnowledgeHit>,
}

#[derive(Debug, Deserialize)]
pub struct VectorRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

pub async fn search_knowledge_handler(
    State(knowledge): State<Arc<KnowledgeBase>>,
    Json(request): Json<KnowledgeSearchRequest>,
) -> Result<Json<KnowledgeSearchResponse>, ApiError> {
    info!(
        "Knowledge search for organization {}: {}",
        request.organization_id, request.query
    );

    let limit = request.limit.clamp(1, MAX_KNOWLEDGE_LIMIT);
    let results = knowledge
        .search(&request.query, &request.organization_id, limit, request.threshold)
        .await?;

    Ok(Json(KnowledgeSearchResponse { results }))
}

pub async fn create_vector_handler(
    State(knowledge): State<Arc<KnowledgeBase>>,
    Json(request): Json<VectorRequest>,
) -> Result<Json<StoredVector>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let stored = knowledge.add(&request.text, request.metadata).await?;
    Ok(Json(stored))
}
