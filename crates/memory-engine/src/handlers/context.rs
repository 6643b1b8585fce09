use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::{JsonMap, OptimizeRequest, OptimizedContext};
use crate::services::memory::{ContextOptimizer, SessionContextStore};
use crate::utils::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContextResponse {
    pub session_id: String,
    pub context: JsonMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub optimized_context: OptimizedContext,
}

pub async fn get_context_handler(
    State(sessions): State<Arc<SessionContextStore>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionContextResponse>, ApiError> {
    let context = sessions.get(&session_id).await?.unwrap_or_default();
    Ok(Json(SessionContextResponse {
        session_id,
        context,
    }))
}

pub async fn update_context_handler(
    State(sessions): State<Arc<SessionContextStore>>,
    Path(session_id): Path<String>,
    Json(context): Json<JsonMap>,
) -> Result<Json<SessionUpdateResponse>, ApiError> {
    sessions.update(&session_id, &context).await?;
    Ok(Json(SessionUpdateResponse {
        session_id,
        status: "updated".to_string(),
    }))
}

/// Never fails once the request body parses.
pub async fn optimize_context_handler(
    State(optimizer): State<Arc<ContextOptimizer>>,
    Json(request): Json<OptimizeRequest>,
) -> Json<OptimizeResponse> {
    Json(OptimizeResponse {
        optimized_context: optimizer.optimize(&request).await,
    })
}
