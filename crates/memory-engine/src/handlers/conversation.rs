use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::models::{ConversationTurn, ScoredDocument, SessionMemory};
use crate::services::memory::MemoryManager;
use crate::utils::error::ApiError;

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMemoryRequest {
    pub user_id: String,
    pub session_id: String,
    pub conversation_turn: ConversationTurn,
    /// The caller's current aggregate for this session, if it keeps one.
    #[serde(default)]
    pub memory: Option<SessionMemory>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMemoryResponse {
    pub memory_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<SessionMemory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMemoryQuery {
    pub user_id: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub user_id: String,
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredDocument>,
    pub total: usize,
}

pub async fn store_memory_handler(
    State(manager): State<Arc<MemoryManager>>,
    Json(request): Json<StoreMemoryRequest>,
) -> Result<Json<StoreMemoryResponse>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId must not be empty".to_string()));
    }

    let outcome = manager
        .store(
            &request.user_id,
            &request.session_id,
            request.conversation_turn,
            request.memory,
        )
        .await?;

    Ok(Json(StoreMemoryResponse {
        memory_id: outcome.memory_id,
        memory: outcome.aggregate,
    }))
}

pub async fn get_memory_handler(
    State(manager): State<Arc<MemoryManager>>,
    Query(query): Query<GetMemoryQuery>,
) -> Result<Json<SessionMemory>, ApiError> {
    let memory = manager
        .get(&query.user_id, query.session_id.as_deref())
        .await?;
    Ok(Json(memory))
}

pub async fn search_memory_handler(
    State(manager): State<Arc<MemoryManager>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    info!("Search request from user {}: {}", query.user_id, query.query);

    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let results = manager.search(&query.user_id, &query.query, limit).await?;

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
    }))
}
