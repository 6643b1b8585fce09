use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::models::{JsonMap, MemoryItem, MemoryType};
use crate::services::memory::{ItemFilter, MemoryManager};
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryRequest {
    pub user_id: String,
    /// Parsed after deserialization so an unknown type is a 400, not a 422.
    #[serde(rename = "type")]
    pub memory_type: String,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResponse {
    pub id: String,
    pub status: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
}

#[derive(Debug, Deserialize)]
pub struct MemoriesQuery {
    #[serde(rename = "type")]
    pub memory_type: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoriesResponse {
    pub user_id: String,
    pub memories: Vec<MemoryItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub user_id: String,
    pub deleted: u64,
}

pub async fn create_memory_handler(
    State(manager): State<Arc<MemoryManager>>,
    Json(request): Json<CreateMemoryRequest>,
) -> Result<Json<MemoryResponse>, ApiError> {
    let memory_type: MemoryType = request.memory_type.parse()?;

    let item = MemoryItem::new(request.user_id, memory_type, request.key, request.value)
        .with_metadata(request.metadata.unwrap_or_default())
        .with_ttl(request.ttl);
    let user_id = item.user_id.clone();

    let id = manager.put_item(item).await?;
    info!("Stored {} memory {}", memory_type, id);

    Ok(Json(MemoryResponse {
        id,
        status: "stored".to_string(),
        user_id,
        memory_type,
    }))
}

pub async fn get_memories_handler(
    State(manager): State<Arc<MemoryManager>>,
    Path(user_id): Path<String>,
    Query(query): Query<MemoriesQuery>,
) -> Result<Json<MemoriesResponse>, ApiError> {
    let memory_type = query
        .memory_type
        .as_deref()
        .map(str::parse::<MemoryType>)
        .transpose()?;

    let filter = ItemFilter {
        memory_type,
        key: query.key,
    };
    let memories = manager.get_items(&user_id, &filter).await?;

    Ok(Json(MemoriesResponse { user_id, memories }))
}

pub async fn delete_memories_handler(
    State(manager): State<Arc<MemoryManager>>,
    Path(user_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = manager.delete_user(&user_id).await?;
    info!("Deleted {} memories for user {}", deleted, user_id);

    Ok(Json(DeleteResponse { user_id, deleted }))
}
