use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    dependencies: BTreeMap<&'static str, &'static str>,
}

fn label(healthy: bool) -> &'static str {
    if healthy {
        "healthy"
    } else {
        "unhealthy"
    }
}

/// Aggregate health. Always 200; a failing store marks the service degraded.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (stores, knowledge, embeddings) = tokio::join!(
        state.memory_manager.health(),
        state.knowledge_base.is_healthy(),
        state.embeddings.is_healthy()
    );
    let vector_db = stores.long_term && knowledge;

    let status = if stores.short_term && vector_db {
        "healthy"
    } else {
        "degraded"
    };

    let dependencies = BTreeMap::from([
        ("redis", label(stores.short_term)),
        ("vector_db", label(vector_db)),
        ("embeddings", label(embeddings)),
    ]);

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies,
        }),
    )
}
